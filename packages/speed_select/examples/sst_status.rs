//! Prints the Speed Select Technology status of the processor package that a logical processor
//! belongs to, along with the class of service of that processor.
//!
//! The package membership of each processor is read from sysfs. Reading SST state typically
//! requires root privileges. Set `RUST_LOG=speed_select=debug` to see every request sent to the
//! control device.

use std::error::Error;
use std::fs;

use argh::FromArgs;
use itertools::Itertools;
use speed_select::{LogicalCpuId, PriorityMode, SpeedSelect};
use tracing_subscriber::EnvFilter;

/// Show the SST status of a processor package.
#[derive(FromArgs)]
struct Args {
    /// logical processor whose package to inspect (default 0)
    #[argh(option, default = "0")]
    cpu: LogicalCpuId,
}

const CPU_SYSFS_DIR: &str = "/sys/devices/system/cpu";

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Args = argh::from_env();

    let sst = SpeedSelect::current();

    if !sst.is_available() {
        println!(
            "SST control device {} is not available",
            sst.device_path().display()
        );
        return Ok(());
    }

    let packages = processors_by_package()?;

    let (package_id, package_cpus) = packages
        .iter()
        .find(|(_, cpus)| cpus.contains(&args.cpu))
        .ok_or_else(|| format!("processor {} is not online", args.cpu))?;

    let info = sst.package_info(package_cpus)?;

    println!("Status for CPU {} / PACKAGE: {package_id}:", args.cpu);

    println!(
        "  SST-PP: {}",
        if info.pp_supported { "enabled" } else { "disabled" }
    );
    println!("    current level: {}", info.pp_current_level);
    println!("    max level: {}", info.pp_max_level);
    println!("    locked: {}", info.pp_locked);
    println!("    version: {:#x}", info.pp_version);

    println!(
        "  SST-CP: {}",
        feature_status(info.cp_supported, info.cp_enabled)
    );
    if info.cp_enabled {
        let priority = match info.cp_priority {
            PriorityMode::Ordered => "ordered",
            PriorityMode::Proportional => "proportional",
        };
        println!("    priority: {priority}");
    }

    println!(
        "  SST-TF: {}",
        feature_status(info.tf_supported, info.tf_enabled)
    );

    println!(
        "  SST-BF: {}",
        feature_status(info.bf_supported, info.bf_enabled)
    );
    println!(
        "    priority cores: {}",
        cpulist::emit(info.bf_cores.iter().copied())
    );

    if info.cp_enabled {
        let clos = sst.clos_id(args.cpu)?;
        println!("  CLOS ID: {clos}");

        if let Some(clos_info) = info.clos_info(clos) {
            println!("    epp: {}", clos_info.epp);
            println!("    prio: {}", clos_info.proportional_priority);
            println!("    min: {}", clos_info.min_frequency);
            println!("    max: {}", clos_info.max_frequency);
            println!("    desired: {}", clos_info.desired_frequency);
        }
    }

    Ok(())
}

fn feature_status(supported: bool, enabled: bool) -> &'static str {
    match (supported, enabled) {
        (_, true) => "enabled",
        (true, false) => "disabled",
        (false, false) => "not supported",
    }
}

/// Groups the online processors by the physical package they belong to, ordered by package ID.
fn processors_by_package() -> Result<Vec<(u32, Vec<LogicalCpuId>)>, Box<dyn Error>> {
    let online = fs::read_to_string(format!("{CPU_SYSFS_DIR}/online"))?;

    let cpus_with_package = cpulist::parse(online.trim())?
        .into_iter()
        .map(|cpu| {
            let path = format!("{CPU_SYSFS_DIR}/cpu{cpu}/topology/physical_package_id");
            let package_id = fs::read_to_string(path)?.trim().parse::<u32>()?;

            Ok::<_, Box<dyn Error>>((package_id, cpu))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(cpus_with_package
        .into_iter()
        .into_group_map()
        .into_iter()
        .sorted_by_key(|(package_id, _)| *package_id)
        .collect())
}
