//! 规则引擎命令行工具
//!
//! 读取规则集和上下文 JSON 文件，输出评估结果。

use anyhow::{Context, Result};
use clap::Parser;
use rule_engine::config::EngineConfig;
use rule_engine::{observability, RuleEngine};
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use tracing::info;

/// 规则集评估工具
#[derive(Parser, Debug)]
#[command(name = "rule-engine")]
#[command(version, about = "对 JSON 上下文评估规则集")]
struct Cli {
    /// 规则集 JSON 文件（根节点为逻辑组）
    #[arg(short, long)]
    rules: PathBuf,

    /// 上下文 JSON 文件
    #[arg(short, long)]
    context: PathBuf,

    /// 上下文文件为记录数组，逐条评估
    #[arg(long)]
    batch: bool,

    /// 输出评估追踪和耗时
    #[arg(long)]
    trace: bool,

    /// 格式化输出 JSON
    #[arg(long)]
    pretty: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = EngineConfig::load().unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {}", e);
        EngineConfig::default()
    });
    observability::init(&config.observability)?;
    info!(environment = %config.environment, "Configuration loaded");

    let rules_json = fs::read_to_string(&cli.rules)
        .with_context(|| format!("无法读取规则文件 {}", cli.rules.display()))?;
    let context_json = fs::read_to_string(&cli.context)
        .with_context(|| format!("无法读取上下文文件 {}", cli.context.display()))?;

    let mut options = config.evaluation.clone();
    options.trace |= cli.trace;
    let with_report = options.trace;

    let engine = RuleEngine::from_json(&rules_json)
        .with_context(|| format!("规则文件 {} 无效", cli.rules.display()))?
        .with_options(options);
    let context: Value = serde_json::from_str(&context_json)
        .with_context(|| format!("上下文文件 {} 不是合法 JSON", cli.context.display()))?;

    // 批量模式下复用同一个绑定的规则集
    let records = match context {
        Value::Array(records) if cli.batch => records,
        _ if cli.batch => anyhow::bail!("批量模式下上下文文件必须是 JSON 数组"),
        record => vec![record],
    };
    info!(records = records.len(), "Evaluating rule set");

    let mut output = records
        .iter()
        .map(|record| {
            if with_report {
                serde_json::to_value(engine.run_with_report(record))
            } else {
                serde_json::to_value(engine.run(record))
            }
        })
        .collect::<Result<Vec<Value>, _>>()?;

    let output = if cli.batch {
        Value::Array(output)
    } else {
        output.pop().unwrap_or(Value::Null)
    };

    let rendered = if cli.pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    println!("{}", rendered);

    Ok(())
}
