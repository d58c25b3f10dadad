//! 数据录入场景运行器

mod scenario;

use anyhow::{Context, Result};
use clap::Parser;
use dataentry_admin::{init_logging, ConfigManager};
use scenario::Scenario;
use tracing::{error, info};

/// 场景运行器命令行参数
#[derive(Parser, Debug)]
#[command(name = "dataentry-runner")]
#[command(about = "按场景文件运行一次登记录入流程")]
struct Args {
    /// 场景文件路径 (JSON)
    #[arg(short, long)]
    scenario: String,

    /// 规则文件路径 (JSON)，覆盖场景内的规则
    #[arg(short, long)]
    rules: Option<String>,

    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 日志级别，覆盖配置文件
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 加载配置
    let config_manager = ConfigManager::new(args.config.as_deref())?;
    let mut config = config_manager.get_config().await;
    if let Some(level) = args.log_level {
        config.logging.level = level;
        config_manager.update_config(config.clone()).await?;
    }

    // 初始化日志
    init_logging(&config.logging)?;

    info!("启动数据录入场景运行器...");
    info!("  场景文件: {}", args.scenario);
    info!("  界面语言: {}", config.settings.locale);

    let mut scenario = Scenario::load(&args.scenario).await?;
    if let Some(rules) = &args.rules {
        info!("  规则文件: {}", rules);
        scenario = scenario.with_rules_file(rules)?;
    }
    let report = match scenario.run(&config_manager.settings().await) {
        Ok(report) => report,
        Err(e) => {
            error!("场景运行失败: {:#}", e);
            return Err(e);
        }
    };

    let output = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
    println!("{}", output);

    info!("场景运行完成, 状态: {:?}", report.status);
    Ok(())
}
