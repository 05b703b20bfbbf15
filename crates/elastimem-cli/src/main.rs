use anyhow::{Context, Result};
use byte_unit::{Byte, UnitType};
use clap::{Parser, Subcommand};
use colored::*;
use elastimem_core::cgroups::{container_cgroup_path, UNLIMITED_THRESHOLD};
use elastimem_core::{
    compute_watermark, cpuset, watermark::DEFAULT_WATERMARK_SCALE, ActivityFilter, CgroupV1Memory,
    ContainerId, LimitKind, MemoryCgroupAccess, ProcFs, VERSION,
};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "elastimem")]
#[command(version = VERSION)]
#[command(about = "Elastic container memory limits - CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the min/low/high watermark band for a capacity in bytes
    Watermark {
        capacity: u64,

        /// Scale factor k in min = k * sqrt(bytes)
        #[arg(long, default_value_t = DEFAULT_WATERMARK_SCALE)]
        scale: u64,
    },

    /// List container cgroups with their limits and usage
    Containers {
        /// Memory controller mount point (default: detected)
        #[arg(long)]
        root: Option<PathBuf>,

        /// Directory under the controller root holding container cgroups
        #[arg(long, default_value = "docker")]
        dir: PathBuf,

        /// Mount tag used to mark containers as active
        #[arg(long, default_value = "/var/lib/lxcfs")]
        mount_tag: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Inspect a cpuset list such as "0-3,8"
    Cpuset {
        set: String,

        /// Check whether this CPU is a member
        #[arg(long)]
        cpu: Option<u32>,
    },

    /// Show version information
    Version,
}

/// One row of `elastimem containers`
#[derive(Debug, Serialize)]
struct ContainerRow {
    id: String,
    active: bool,
    usage: Option<u64>,
    soft_limit: Option<u64>,
    hard_limit: Option<u64>,
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Watermark { capacity, scale }) => {
            show_watermark(capacity, scale);
            Ok(())
        }
        Some(Commands::Containers {
            root,
            dir,
            mount_tag,
            json,
        }) => list_containers(root, dir, &mount_tag, json),
        Some(Commands::Cpuset { set, cpu }) => {
            show_cpuset(&set, cpu);
            Ok(())
        }
        Some(Commands::Version) => {
            println!("elastimem v{}", VERSION);
            println!("Elastic memory limits for container cgroups");
            Ok(())
        }
        None => list_containers(None, PathBuf::from("docker"), "/var/lib/lxcfs", false),
    };

    if let Err(e) = result {
        eprintln!("{}", format!("❌ {:#}", e).red());
        std::process::exit(1);
    }
}

fn human(bytes: u64) -> String {
    if bytes >= UNLIMITED_THRESHOLD {
        return "unlimited".to_string();
    }
    format!(
        "{:.2}",
        Byte::from_u64(bytes).get_appropriate_unit(UnitType::Binary)
    )
}

fn show_watermark(capacity: u64, scale: u64) {
    let mark = compute_watermark(capacity, scale);

    println!("{}", "=== Watermark ===".green().bold());
    println!("  Capacity: {}", human(capacity));
    println!("  Scale:    {}", scale);
    println!("  Min:      {} ({} bytes)", human(mark.min), mark.min);
    println!("  Low:      {} ({} bytes)", human(mark.low), mark.low);
    println!("  High:     {} ({} bytes)", human(mark.high), mark.high);

    if !mark.is_valid() {
        println!("{}", "⚠️  Band is degenerate for this capacity".yellow());
    }
}

fn list_containers(root: Option<PathBuf>, dir: PathBuf, mount_tag: &str, json: bool) -> Result<()> {
    let memory = match root {
        Some(root) => CgroupV1Memory::new(root),
        None => CgroupV1Memory::discover().context("Failed to locate the memory controller")?,
    };
    let filter = ActivityFilter::new(mount_tag);
    let procs = ProcFs::new();

    let entries = memory
        .list_children(&dir)
        .with_context(|| format!("Failed to list {:?}", memory.root().join(&dir)))?;

    let mut rows = Vec::new();
    for entry in entries {
        if !entry.is_dir || !ContainerId::matches_shape(&entry.name) {
            continue;
        }
        let cgroup = match container_cgroup_path(&dir, &entry.name) {
            Ok(path) => path,
            Err(e) => {
                eprintln!("{}", format!("⚠️  {}", e).yellow());
                continue;
            }
        };

        rows.push(ContainerRow {
            active: filter.is_active(&cgroup, &memory, &procs),
            usage: memory.read_usage(&cgroup).ok(),
            soft_limit: memory.read_limit(&cgroup, LimitKind::Soft).ok(),
            hard_limit: memory.read_limit(&cgroup, LimitKind::Hard).ok(),
            id: entry.name,
        });
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!("{}", "=== Containers ===".green().bold());
    if rows.is_empty() {
        println!("\n{}", "No containers found".yellow());
        return Ok(());
    }

    let show = |v: Option<u64>| v.map(human).unwrap_or_else(|| "?".to_string());
    for row in &rows {
        let status = if row.active {
            "● active".green()
        } else {
            "○ idle".dimmed()
        };
        println!(
            "  {} {} usage: {}, soft: {}, hard: {}",
            row.id.get(..12).unwrap_or(row.id.as_str()),
            status,
            show(row.usage),
            show(row.soft_limit),
            show(row.hard_limit)
        );
    }
    println!(
        "\n{} {} ({} active)",
        "Total:".cyan(),
        rows.len(),
        rows.iter().filter(|r| r.active).count()
    );

    Ok(())
}

fn show_cpuset(set: &str, cpu: Option<u32>) {
    println!("{}", "=== Cpuset ===".green().bold());
    println!("  Set:         {:?}", set);
    println!("  Cardinality: {}", cpuset::cardinality(set));

    if let Some(cpu) = cpu {
        if cpuset::contains(cpu, set) {
            println!("{}", format!("✅ CPU {} is in the set", cpu).green());
        } else {
            println!("{}", format!("❌ CPU {} is not in the set", cpu).red());
        }
    }
}
