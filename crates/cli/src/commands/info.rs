//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::ServiceBlueprint;
use serde::Serialize;

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    source: String,
    decoder: DecoderInfo,
    transport: TransportInfo,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sinks: Vec<SinkInfo>,
    report_interval_secs: u64,
}

#[derive(Serialize)]
struct DecoderInfo {
    preset: String,
    packet_size: usize,
    frame_size: usize,
    frame_bytes: usize,
    header_bytes: String,
    reserved_sentinel: String,
    sequence_mask: String,
    strict_reserved: bool,
    buffer_overrun_ceiling: usize,
    use_length_prefix: bool,
    batch_length_ceiling: u32,
}

#[derive(Serialize)]
struct TransportInfo {
    listen_addr: String,
    read_buffer_size: usize,
    channel_capacity: usize,
    drop_policy: String,
}

#[derive(Serialize)]
struct SinkInfo {
    name: String,
    sink_type: String,
    queue_capacity: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    let blueprint = super::run::read_config(args.config.as_deref())?;
    let source = match &args.config {
        Some(path) => path.display().to_string(),
        None => "built-in defaults".to_string(),
    };

    let info = build_config_info(&blueprint, source);
    if args.json {
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&info);
    }

    Ok(())
}

fn build_config_info(blueprint: &ServiceBlueprint, source: String) -> ConfigInfo {
    let decoder = blueprint.to_decoder_config();
    let transport = &blueprint.transport;

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        source,
        decoder: DecoderInfo {
            preset: blueprint.decoder.preset.to_string(),
            packet_size: decoder.packet_size,
            frame_size: decoder.frame_size,
            frame_bytes: decoder.frame_bytes(),
            header_bytes: format!(
                "{:02X} {:02X}",
                decoder.header_bytes[0], decoder.header_bytes[1]
            ),
            reserved_sentinel: format!("0x{:02X}", decoder.reserved_sentinel),
            sequence_mask: format!("0x{:02X}", decoder.sequence_mask),
            strict_reserved: decoder.strict_reserved,
            buffer_overrun_ceiling: decoder.buffer_overrun_ceiling,
            use_length_prefix: decoder.use_length_prefix,
            batch_length_ceiling: decoder.batch_length_ceiling,
        },
        transport: TransportInfo {
            listen_addr: transport.listen_addr.clone(),
            read_buffer_size: transport.read_buffer_size,
            channel_capacity: transport.channel_capacity,
            drop_policy: format!("{:?}", transport.drop_policy),
        },
        sinks: blueprint
            .sinks
            .iter()
            .map(|s| SinkInfo {
                name: s.name.clone(),
                sink_type: format!("{:?}", s.sink_type),
                queue_capacity: s.queue_capacity,
                path: s.params.get("path").cloned(),
            })
            .collect(),
        report_interval_secs: blueprint.stats.report_interval_secs,
    }
}

fn print_config_info(info: &ConfigInfo) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               LiDAR Framer Configuration                     ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");
    println!("Source: {} ({})\n", info.source, info.version);

    let d = &info.decoder;
    println!("📦 Decoder ({})", d.preset);
    println!(
        "   ├─ Packet: {} bytes, {} per frame ({} bytes)",
        d.packet_size, d.frame_size, d.frame_bytes
    );
    println!("   ├─ Header: {}", d.header_bytes);
    println!(
        "   ├─ Reserved: {} (strict: {})",
        d.reserved_sentinel, d.strict_reserved
    );
    println!("   ├─ Sequence mask: {}", d.sequence_mask);
    println!("   ├─ Overrun ceiling: {} bytes", d.buffer_overrun_ceiling);
    if d.use_length_prefix {
        println!(
            "   └─ Length prefix: on (ceiling {} bytes)",
            d.batch_length_ceiling
        );
    } else {
        println!("   └─ Length prefix: off");
    }

    let t = &info.transport;
    println!("\n🔌 Transport");
    println!("   ├─ Listen: {}", t.listen_addr);
    println!("   ├─ Read buffer: {} bytes", t.read_buffer_size);
    println!("   ├─ Channel capacity: {}", t.channel_capacity);
    println!("   └─ Drop policy: {}", t.drop_policy);

    println!("\n📤 Sinks ({})", info.sinks.len());
    for (i, sink) in info.sinks.iter().enumerate() {
        let prefix = if i == info.sinks.len() - 1 { "└─" } else { "├─" };
        match &sink.path {
            Some(path) => println!(
                "   {} {} ({}, queue {}) -> {}",
                prefix, sink.name, sink.sink_type, sink.queue_capacity, path
            ),
            None => println!(
                "   {} {} ({}, queue {})",
                prefix, sink.name, sink.sink_type, sink.queue_capacity
            ),
        }
    }

    if info.report_interval_secs == 0 {
        println!("\n📈 Stats: summary on exit only");
    } else {
        println!("\n📈 Stats: every {}s", info.report_interval_secs);
    }
}
