//! mote 网络上的可靠传输仿真
//!
//! 用场景文件（`--scenario`）或命令行参数描述拓扑与流量，运行仿真并输出汇总。

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use mote_transport::app::{AppReport, ScenarioReport, load_scenario, run_scenario};
use mote_transport::net::NodeAddr;
use mote_transport::proto::{Backoff, TransportConfig};
use mote_transport::sim::{ClientSpec, LinkDefaults, ScenarioSpec, ServerSpec, TopologySpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Topology {
    Line,
    Grid,
}

#[derive(Debug, Parser)]
#[command(
    name = "mote_transfer",
    about = "在多跳、有损的 mote 网络上运行可靠传输仿真"
)]
struct Args {
    /// 场景文件（JSON）；给出时忽略拓扑与流量相关参数
    #[arg(long)]
    scenario: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Topology::Line)]
    topology: Topology,
    /// 链状拓扑的 mote 数
    #[arg(long, default_value_t = 4)]
    nodes: u16,
    #[arg(long, default_value_t = 3)]
    rows: u16,
    #[arg(long, default_value_t = 3)]
    cols: u16,
    /// 每条链路的丢包率
    #[arg(long, default_value_t = 0.0)]
    loss: f64,
    /// 单向链路传播时延（毫秒）
    #[arg(long, default_value_t = 1)]
    link_latency_ms: u64,

    /// 服务端 mote 地址
    #[arg(long, default_value_t = 1)]
    server: u16,
    #[arg(long, default_value_t = 123)]
    port: u16,
    /// 客户端 mote 地址，逗号分隔；默认是编号最大的 mote
    #[arg(long, value_delimiter = ',')]
    clients: Vec<u16>,
    /// 每个客户端发送的计数值个数
    #[arg(long, default_value_t = 1000)]
    transfer: u16,

    /// 仿真运行到多少毫秒；默认运行到事件队列为空
    #[arg(long)]
    until_ms: Option<u64>,
    #[arg(long)]
    seed: Option<u64>,
    /// 覆盖最大重试次数
    #[arg(long)]
    retries: Option<u32>,
    /// 覆盖初始 RTO（毫秒）
    #[arg(long)]
    rto_ms: Option<u64>,
    /// 使用固定 RTO（不做指数退避）
    #[arg(long)]
    fixed_backoff: bool,

    /// 把 JSON 报告写到文件
    #[arg(long)]
    report_json: Option<PathBuf>,
}

fn inline_scenario(args: &Args) -> ScenarioSpec {
    let (topology, last) = match args.topology {
        Topology::Line => (TopologySpec::Line { nodes: args.nodes }, args.nodes),
        Topology::Grid => (
            TopologySpec::Grid {
                rows: args.rows,
                cols: args.cols,
            },
            args.rows.saturating_mul(args.cols),
        ),
    };
    let clients = if args.clients.is_empty() {
        vec![last]
    } else {
        args.clients.clone()
    };
    ScenarioSpec {
        schema_version: 1,
        meta: None,
        topology,
        link: Some(LinkDefaults {
            latency_ms: Some(args.link_latency_ms),
            bandwidth_bps: None,
            loss: Some(args.loss),
        }),
        transport: None,
        servers: vec![ServerSpec {
            node: NodeAddr(args.server),
            port: args.port,
            start_ms: 0,
        }],
        clients: clients
            .into_iter()
            .map(|c| ClientSpec {
                node: NodeAddr(c),
                server: NodeAddr(args.server),
                src_port: None,
                dst_port: args.port,
                transfer: args.transfer,
                start_ms: 0,
                close_when_done: true,
            })
            .collect(),
        closes: Vec::new(),
        until_ms: None,
        seed: None,
    }
}

fn apply_overrides(spec: &mut ScenarioSpec, args: &Args) {
    if args.until_ms.is_some() {
        spec.until_ms = args.until_ms;
    }
    if args.seed.is_some() {
        spec.seed = args.seed;
    }
    if args.retries.is_none() && args.rto_ms.is_none() && !args.fixed_backoff {
        return;
    }
    let cfg = spec.transport.get_or_insert_with(TransportConfig::default);
    if let Some(r) = args.retries {
        cfg.max_retries = r;
    }
    if let Some(ms) = args.rto_ms {
        cfg.init_rto_ms = ms;
        cfg.max_rto_ms = cfg.max_rto_ms.max(ms);
    }
    if args.fixed_backoff {
        cfg.backoff = Backoff::Fixed;
    }
}

fn print_summary(report: &ScenarioReport) {
    println!(
        "done @ {}ms, events={}, sent_pkts={}, delivered_pkts={}, lost_pkts={}",
        report.end_time_ms,
        report.events_executed,
        report.network.sent_pkts,
        report.network.delivered_pkts,
        report.network.lost_pkts
    );
    for m in &report.motes {
        for app in &m.apps {
            match app {
                AppReport::Server(s) => {
                    for sess in &s.sessions {
                        println!(
                            "session node={} port={} remote={}:{} received={} order_errors={} outcome={:?}",
                            m.addr,
                            s.port,
                            sess.remote.addr,
                            sess.remote.port,
                            sess.values_received,
                            sess.order_errors,
                            sess.outcome
                        );
                    }
                }
                AppReport::Client(c) => {
                    println!(
                        "client node={} src_port={} server={}:{} written={}/{} outcome={:?} retransmissions={}",
                        m.addr,
                        c.src_port,
                        c.server,
                        c.dst_port,
                        c.values_written,
                        c.transfer,
                        c.outcome,
                        m.transport.retransmissions
                    );
                }
            }
        }
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut spec = match &args.scenario {
        Some(path) => load_scenario(path)?,
        None => inline_scenario(args),
    };
    apply_overrides(&mut spec, args);

    let report = run_scenario(&spec)?;
    print_summary(&report);

    if let Some(path) = &args.report_json {
        let raw = serde_json::to_string_pretty(&report)?;
        fs::write(path, raw)?;
    }
    Ok(())
}

fn main() -> ExitCode {
    // 初始化 tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            let mut source = e.source();
            while let Some(cause) = source {
                eprintln!("  caused by: {cause}");
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}
