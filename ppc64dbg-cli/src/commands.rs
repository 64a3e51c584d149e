// CLI command handlers
use anyhow::{Context, Result};
use ppc64dbg_core::abi::AbiSysVPpc64;
use ppc64dbg_core::arch::elf::ElfImage;
use ppc64dbg_core::arch::{Architecture, ArchitecturePpc64, SymbolContext};
use ppc64dbg_core::emulate::EmulateInstructionPpc64;
use ppc64dbg_core::target::TargetSpec;
use std::path::Path;

pub fn load_image(elf: &Path, target: Option<TargetSpec>) -> Result<ElfImage> {
    let image = ElfImage::from_path(elf)?;
    match target {
        Some(target) => image.with_target(target),
        None => Ok(image),
    }
}

pub fn print_plans(target: &TargetSpec, json: bool) -> Result<()> {
    let abi = AbiSysVPpc64::create(target).context("Target is not a 64-bit PowerPC")?;
    let plans = [
        abi.create_function_entry_unwind_plan(),
        abi.create_default_unwind_plan(),
        EmulateInstructionPpc64::create_function_entry_unwind(),
    ];

    if json {
        println!("{}", serde_json::to_string_pretty(&plans)?);
        return Ok(());
    }
    for plan in &plans {
        println!("{}", plan);
    }
    println!("Red zone: {} bytes", abi.red_zone_size());
    Ok(())
}

pub fn print_entries(image: &ElfImage, only: Option<&str>) -> Result<()> {
    let target = &image.target;
    let arch = ArchitecturePpc64::create(target).context("Target is not a 64-bit PowerPC")?;

    println!("{} ({:?}), entry point 0x{:016X}", arch.plugin_name(), image.target.arch, image.entry);
    println!(
        "{:<18} {:<18} {:>6} {:>9}  {}",
        "global entry", "local entry", "offset", "prologue", "name"
    );

    let mut shown = 0usize;
    for symbol in &image.symbols {
        if only.is_some_and(|name| name != symbol.name) {
            continue;
        }
        let sc = SymbolContext::from_symbol(symbol.clone());
        let skip = arch
            .get_bytes_to_skip(target, &sc, symbol.local_entry())
            .map_or_else(|| "n/a".to_string(), |skip| skip.bytes_to_skip.to_string());
        println!(
            "0x{:016X} 0x{:016X} {:>6} {:>9}  {}",
            symbol.address,
            arch.adjust_breakpoint_address(symbol, symbol.address),
            symbol.local_entry_offset(),
            skip,
            symbol.name
        );
        shown += 1;
    }

    if let Some(name) = only {
        anyhow::ensure!(shown > 0, "Symbol not found: {}", name);
    }
    Ok(())
}

pub fn print_prologue(image: &ElfImage, name: &str, json: bool) -> Result<()> {
    let symbol = image
        .symbol(name)
        .with_context(|| format!("Symbol not found: {}", name))?;
    let analysis = image.analyze(symbol, symbol.local_entry())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
        return Ok(());
    }

    println!(
        "{} @ 0x{:016X}, local entry 0x{:016X} (size {})",
        symbol.name,
        symbol.address,
        symbol.local_entry(),
        symbol.size
    );
    for insn in &analysis.instructions {
        println!("  0x{:016X}: {:08x}  {}", insn.address, insn.word, insn.name);
        for event in &insn.events {
            println!("      {:?} {:?} -> {:?}", event.context.kind, event.context.info, event.access);
        }
    }
    println!("Emulated {} byte(s)", analysis.byte_size);
    println!("{}", analysis.plan);
    Ok(())
}
