use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use serde_json::{json, Value};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use uptime_application::TaskPayload;
use uptime_config::{AppConfig, UptimeCheckConfig};
use uptime_domain::entities::{Protocol, TaskConfig};
use uptime_domain::{TargetResolver, TaskConfigValidator};
use uptime_infrastructure::StaticHostInventory;

#[tokio::main]
async fn main() -> Result<()> {
    let file_arg = || {
        Arg::new("file")
            .short('f')
            .long("file")
            .value_name("FILE")
            .help("拨测任务请求体 (JSON)")
            .required(true)
    };

    let matches = Command::new("uptime-check")
        .version(env!("CARGO_PKG_VERSION"))
        .about("拨测任务配置校验与目标解析工具")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径")
                .global(true),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别，缺省时取配置文件")
                .value_parser(["trace", "debug", "info", "warn", "error"])
                .global(true),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式，缺省时取配置文件")
                .value_parser(["json", "pretty"])
                .global(true),
        )
        .subcommand(
            Command::new("validate")
                .about("校验任务配置并输出规范化后的 config")
                .arg(file_arg()),
        )
        .subcommand(
            Command::new("targets")
                .about("解析任务的拨测目标地址")
                .arg(file_arg())
                .arg(
                    Arg::new("hosts")
                        .long("hosts")
                        .value_name("FILE")
                        .help("静态主机清单 (JSON 数组)"),
                )
                .arg(
                    Arg::new("biz-id")
                        .short('b')
                        .long("biz-id")
                        .value_name("ID")
                        .help("业务ID，缺省时取请求体中的 bk_biz_id")
                        .value_parser(clap::value_parser!(i64)),
                ),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config").map(String::as_str);
    let config = AppConfig::load(config_path)
        .with_context(|| format!("加载配置失败: {}", config_path.unwrap_or("<default>")))?;

    let log_level = matches
        .get_one::<String>("log-level")
        .cloned()
        .unwrap_or_else(|| config.logging.level.to_string());
    let log_format = matches
        .get_one::<String>("log-format")
        .cloned()
        .unwrap_or_else(|| config.logging.format.to_string());
    init_logging(&log_level, &log_format)?;

    debug!(?config, "配置加载完成");

    let output = match matches.subcommand() {
        Some(("validate", sub)) => run_validate(&config.uptime_check, sub)?,
        Some(("targets", sub)) => run_targets(&config.uptime_check, sub).await?,
        Some((other, _)) => return Err(anyhow::anyhow!("不支持的子命令: {other}")),
        None => return Err(anyhow::anyhow!("缺少子命令")),
    };

    println!(
        "{}",
        serde_json::to_string_pretty(&output).context("序列化输出失败")?
    );
    Ok(())
}

/// 初始化日志系统
fn init_logging(log_level: &str, log_format: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    // 标准输出留给命令结果
    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        "json" => {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .try_init()
                .context("初始化JSON日志格式失败")?;
        }
        "pretty" => {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .pretty()
                        .with_writer(std::io::stderr),
                )
                .try_init()
                .context("初始化Pretty日志格式失败")?;
        }
        _ => {
            return Err(anyhow::anyhow!("不支持的日志格式: {log_format}"));
        }
    }

    Ok(())
}

struct LoadedTask {
    biz_id: Option<i64>,
    protocol: Protocol,
    config: TaskConfig,
}

/// 读取请求体并完成协议校验
fn load_task(settings: &UptimeCheckConfig, path: &str) -> Result<LoadedTask> {
    let content = std::fs::read_to_string(Path::new(path))
        .with_context(|| format!("读取请求体失败: {path}"))?;
    let raw: Value =
        serde_json::from_str(&content).with_context(|| format!("请求体不是合法的 JSON: {path}"))?;

    let payload = TaskPayload::from_json(&raw).context("请求体解析失败")?;
    let protocol = payload.protocol.context("请求体缺少 protocol")?;
    let config = payload.config.context("请求体缺少 config")?;

    let validator = TaskConfigValidator::new(settings.task_min_period);
    let config = validator
        .validate(protocol, &config)
        .context("任务配置校验失败")?;
    info!(protocol = %protocol, period = config.period, "任务配置校验通过");

    Ok(LoadedTask {
        biz_id: payload.biz_id,
        protocol,
        config,
    })
}

fn run_validate(settings: &UptimeCheckConfig, matches: &ArgMatches) -> Result<Value> {
    let path = matches.get_one::<String>("file").context("缺少 --file 参数")?;
    let task = load_task(settings, path)?;
    Ok(json!({
        "protocol": task.protocol,
        "config": task.config,
    }))
}

async fn run_targets(settings: &UptimeCheckConfig, matches: &ArgMatches) -> Result<Value> {
    let path = matches.get_one::<String>("file").context("缺少 --file 参数")?;
    let task = load_task(settings, path)?;

    let inventory = match matches.get_one::<String>("hosts") {
        Some(hosts) => StaticHostInventory::from_file(hosts)
            .with_context(|| format!("加载主机清单失败: {hosts}"))?,
        None => StaticHostInventory::default(),
    };
    let biz_id = matches
        .get_one::<i64>("biz-id")
        .copied()
        .or(task.biz_id)
        .unwrap_or_default();

    let resolver = TargetResolver::new(
        Arc::new(inventory),
        settings.default_output_fields.clone(),
        settings.host_resolution_timeout(),
    );
    let targets = resolver
        .resolve(task.protocol, &task.config, biz_id)
        .await
        .context("拨测目标解析失败")?;
    info!(biz_id, count = targets.len(), "拨测目标解析完成");

    Ok(json!({
        "protocol": task.protocol,
        "bk_biz_id": biz_id,
        "url": targets,
    }))
}
