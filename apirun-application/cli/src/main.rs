//! APIRUN CLI 应用

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod bundle;
mod commands;
mod config;

#[derive(Parser)]
#[command(name = "apirun")]
#[command(about = "APIRUN - 接口测试分发与场景编译工具", long_about = None)]
#[command(version)]
struct Cli {
    /// 日志级别 (RUST_LOG 优先)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 资源池管理
    Pool {
        #[command(subcommand)]
        action: PoolAction,
    },

    /// 编译场景包并输出可执行树
    Compile {
        /// 场景包文件 (YAML/JSON)
        bundle: String,

        /// 报告 ID，指定后步骤唯一 ID 由报告 ID 推导
        #[arg(long)]
        report_id: Option<String>,

        /// 输出格式 (json/yaml)
        #[arg(short = 'f', long, default_value = "json")]
        format: String,
    },

    /// 编译场景包并分发到资源池
    Run {
        /// 场景包文件 (YAML/JSON)
        bundle: String,

        /// 项目 ID (默认取场景包或配置文件)
        #[arg(long)]
        project: Option<String>,

        /// 资源池 ID (默认使用项目默认资源池)
        #[arg(long)]
        pool: Option<String>,

        /// 预先生成的报告 ID
        #[arg(long)]
        report_id: Option<String>,

        /// 环境 ID，覆盖场景自身环境
        #[arg(long)]
        env: Option<String>,

        /// 环境 ID 为环境组
        #[arg(long, requires = "env")]
        grouped: bool,

        /// 后端调试 (不保存结果)
        #[arg(long, conflicts_with = "frontend")]
        debug: bool,

        /// 前端调试 (只输出执行请求)
        #[arg(long)]
        frontend: bool,
    },

    /// 预览批量分片
    Shard {
        /// 任务数
        #[arg(long)]
        tasks: usize,

        /// 节点数
        #[arg(long)]
        workers: usize,
    },

    /// 执行结果查询
    Report {
        #[command(subcommand)]
        action: ReportAction,
    },
}

#[derive(Subcommand)]
enum PoolAction {
    /// 添加节点资源池
    Add {
        /// 资源池 ID
        id: String,
        /// 名称
        #[arg(long)]
        name: Option<String>,
        /// 执行节点回调地址
        #[arg(long)]
        server_url: Option<String>,
    },
    /// 添加编排资源池
    AddOrchestrated {
        /// 资源池 ID
        id: String,
        /// 编排器 API 地址
        #[arg(long)]
        api_url: String,
        /// 命名空间
        #[arg(long)]
        namespace: String,
        /// 部署名称
        #[arg(long)]
        deploy: String,
        /// 访问令牌
        #[arg(long)]
        token: Option<String>,
        /// 最大并发
        #[arg(long, default_value = "10")]
        concurrency: u32,
        /// 单 Pod 线程数
        #[arg(long, default_value = "1")]
        pod_threads: u32,
    },
    /// 添加执行节点
    NodeAdd {
        /// 资源池 ID
        pool: String,
        /// 节点 IP
        ip: String,
        /// 节点端口
        port: u16,
        /// 节点最大并发
        #[arg(long, default_value = "1")]
        concurrency: u32,
        /// 单任务并发
        #[arg(long)]
        per_task: Option<u32>,
    },
    /// 移除执行节点
    NodeRemove {
        pool: String,
        ip: String,
        port: u16,
    },
    /// 列出资源池
    List {
        /// 输出格式 (table/json/yaml)
        #[arg(short = 'f', long, default_value = "table")]
        format: String,
    },
    /// 授权项目使用资源池
    Grant { project: String, pool: String },
    /// 设置项目默认资源池
    Default { project: String, pool: String },
    /// 启用资源池
    Enable { id: String },
    /// 禁用资源池
    Disable { id: String },
    /// 删除资源池
    Delete { id: String },
}

#[derive(Subcommand)]
enum ReportAction {
    /// 显示场景报告及步骤
    Show { id: String },
    /// 列出有错误标记的任务项
    Errors,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 初始化日志
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("APIRUN CLI 启动");

    match cli.command {
        Commands::Pool { action } => commands::pool::handle(action).await?,
        Commands::Compile {
            bundle,
            report_id,
            format,
        } => commands::scenario::compile(&bundle, report_id, &format).await?,
        Commands::Run {
            bundle,
            project,
            pool,
            report_id,
            env,
            grouped,
            debug,
            frontend,
        } => {
            let options = commands::scenario::RunOptions {
                project,
                pool,
                report_id,
                env,
                grouped,
                debug,
                frontend,
            };
            commands::scenario::run(&bundle, options).await?
        }
        Commands::Shard { tasks, workers } => commands::shard::preview(tasks, workers)?,
        Commands::Report { action } => commands::report::handle(action).await?,
    }

    Ok(())
}
