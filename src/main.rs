//! # OCR Gateway 主程序
//!
//! 加载配置，组装识别流水线并启动 HTTP 代理

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use ocr_gateway::{
    GatewayServer, RecognitionPipeline, Result,
    config::load_config,
    lerror, linfo,
    logging::{self, LogComponent, LogStage},
};

#[derive(Debug, Parser)]
#[command(name = "ocr-gateway")]
#[command(about = "Token-caching recognition gateway")]
#[command(version)]
struct Cli {
    /// 配置文件路径（覆盖 GATEWAY_CONFIG_PATH 与默认路径）
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 监听端口（覆盖配置文件）
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// 日志级别，RUST_LOG 存在时以其为准
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // .env 不存在时忽略
    let dotenv_loaded = dotenvy::dotenv().is_ok();

    logging::init_logging(cli.log_level.as_deref());

    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::Main,
        "service_starting",
        &format!(
            "服务启动 (version {}, .env {})",
            env!("CARGO_PKG_VERSION"),
            if dotenv_loaded { "已加载" } else { "未找到" }
        )
    );

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.server.port = port;
        config.validate()?;
    }

    let pipeline = Arc::new(RecognitionPipeline::from_config(&config.provider)?);
    let server = GatewayServer::new(config, pipeline);

    if let Err(e) = server.serve().await {
        lerror!(
            "system",
            LogStage::Startup,
            LogComponent::Main,
            "service_start_failed",
            &format!("服务运行失败: {e:?}")
        );
        return Err(e);
    }

    linfo!(
        "system",
        LogStage::Shutdown,
        LogComponent::Main,
        "service_shutdown",
        "服务正常关闭"
    );
    Ok(())
}
