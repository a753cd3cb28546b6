//! CLI surface for the core (spec §6): `list`, `extract`, `textures`,
//! `audio`, `meshes`, `scene`, `scripts`. A thin adapter — every subcommand
//! bottoms out in a `hype_extract` library call; this binary only wires
//! arguments, a `FileProvider`, and output files together.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use hype_extract::container::{self, BnmEntry, StreamType};
use hype_extract::emit;
use hype_extract::error::{BatchReport, CancelToken};
use hype_extract::level::OuterXor;
use hype_extract::provider::{DirectoryProvider, FileProvider, Iso9660Provider};
use hype_extract::script::TypeTables;
use hype_extract::texture;

#[derive(Parser)]
#[command(name = "hype-extract", about = "Reconstructs assets from Hype: The Time Quest archives")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Prints every path in a disc image or directory, one per line.
    List {
        source: PathBuf,
    },
    /// Converts every recognized file in `source` into `output`.
    Extract {
        source: PathBuf,
        output: Option<PathBuf>,
        #[arg(long)]
        raw: bool,
        #[arg(long)]
        pattern: Option<String>,
    },
    /// Extracts every texture in a CNT archive to PNG.
    Textures {
        cnt: PathBuf,
        #[arg(long, default_value = "out")]
        output: PathBuf,
    },
    /// Decodes an APM or BNM audio file to WAV.
    Audio {
        file: PathBuf,
        #[arg(long, default_value = "out")]
        output: PathBuf,
    },
    /// Lists meshes found in a level directory.
    Meshes {
        level_dir: PathBuf,
    },
    /// Prints a level's scene hierarchy.
    Scene {
        level_dir: PathBuf,
    },
    /// Emits every AI script found in a level directory as S-expressions.
    Scripts {
        level_dir: PathBuf,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        raw: bool,
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn open_provider(source: &Path) -> Result<Box<dyn FileProvider>> {
    if source.is_dir() {
        return Ok(Box::new(DirectoryProvider::new(source)));
    }
    if source
        .extension()
        .map(|e| e.eq_ignore_ascii_case("iso"))
        .unwrap_or(false)
    {
        return Ok(Box::new(Iso9660Provider::new(source)));
    }
    bail!("{}: not a directory or .iso image", source.display());
}

fn read_all(provider: &dyn FileProvider, path: &str) -> Result<Vec<u8>> {
    let mut stream = provider
        .open(path)
        .with_context(|| format!("opening {path}"))?;
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf)?;
    Ok(buf)
}

fn has_extension(path: &str, ext: &str) -> bool {
    Path::new(path)
        .extension()
        .map(|e| e.eq_ignore_ascii_case(ext))
        .unwrap_or(false)
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let code = match cli.command {
        Command::List { source } => cmd_list(&source)?,
        Command::Extract { source, output, raw, pattern } => {
            cmd_extract(&source, output.as_deref(), raw, pattern.as_deref())?
        }
        Command::Textures { cnt, output } => cmd_textures(&cnt, &output)?,
        Command::Audio { file, output } => cmd_audio(&file, &output)?,
        Command::Meshes { level_dir } => cmd_meshes(&level_dir)?,
        Command::Scene { level_dir } => cmd_scene(&level_dir)?,
        Command::Scripts { level_dir, limit, raw, output } => {
            cmd_scripts(&level_dir, limit, raw, output.as_deref())?
        }
    };

    std::process::exit(code);
}

fn cmd_list(source: &Path) -> Result<i32> {
    let provider = open_provider(source)?;
    for path in provider.list()? {
        println!("{path}");
    }
    Ok(0)
}

/// Default extraction: CNT -> per-texture PNGs, BNM -> per-entry WAVs, APM
/// -> a single WAV, each under `output` mirroring the source path. `--raw`
/// copies bytes verbatim instead. `--pattern` keeps only paths containing
/// the given substring (spec §6 `extract`).
fn cmd_extract(source: &Path, output: Option<&Path>, raw: bool, pattern: Option<&str>) -> Result<i32> {
    let provider = open_provider(source)?;
    let output = output.map(PathBuf::from).unwrap_or_else(|| PathBuf::from("out"));
    let mut report = BatchReport::default();
    let cancel = CancelToken::new();

    for path in provider.list()? {
        if cancel.is_cancelled() {
            report.record_cancelled();
            continue;
        }
        if let Some(p) = pattern {
            if !path.contains(p) {
                continue;
            }
        }

        let dest_base = output.join(path.trim_start_matches('/'));
        let result = if raw {
            extract_raw(provider.as_ref(), &path, &dest_base)
        } else if has_extension(&path, "cnt") {
            extract_cnt(provider.as_ref(), &path, &dest_base.with_extension(""))
        } else if has_extension(&path, "bnm") {
            extract_bnm(provider.as_ref(), &path, &dest_base.with_extension(""))
        } else if has_extension(&path, "apm") {
            extract_apm(provider.as_ref(), &path, &dest_base.with_extension("wav"))
        } else {
            extract_raw(provider.as_ref(), &path, &dest_base)
        };

        match result {
            Ok(()) => report.record_ok(),
            Err(err) => {
                log::warn!("skipping {path}: {err:#}");
                report.record_failure();
            }
        }
    }

    log::info!(
        "extract: {} succeeded, {} failed, {} cancelled",
        report.succeeded, report.failed, report.cancelled
    );
    Ok(report.exit_code())
}

fn extract_raw(provider: &dyn FileProvider, path: &str, dest: &Path) -> Result<()> {
    let bytes = read_all(provider, path)?;
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(dest, bytes)?;
    Ok(())
}

fn extract_cnt(provider: &dyn FileProvider, path: &str, dest_dir: &Path) -> Result<()> {
    let data = read_all(provider, path)?;
    let archive = container::CntArchive::parse(&data)?;
    fs::create_dir_all(dest_dir)?;

    let source_is_textures_cnt = path.to_lowercase().contains("textures");
    for entry in &archive.files {
        let raw = archive.extract(entry, &data)?;
        let mut tex = match texture::decode_gf(&raw) {
            Ok(t) => t,
            Err(err) => {
                log::warn!("{path}/{}: not a GF texture ({err}), copying raw", entry.name);
                fs::write(dest_dir.join(&entry.name), &raw)?;
                continue;
            }
        };
        if texture::needs_vertical_flip(source_is_textures_cnt, tex.width, tex.height) {
            texture::flip_vertical(&mut tex.rgba, tex.width, tex.height);
        }
        let png_name = Path::new(&entry.name).with_extension("png");
        emit::image::write_png(&tex, &dest_dir.join(png_name))?;
    }
    Ok(())
}

fn decode_bnm_entry(data: &[u8], entry: &BnmEntry) -> Result<Vec<i16>> {
    let start = entry.absolute_offset as usize;
    let end = start
        .checked_add(entry.stream_size as usize)
        .context("BNM entry size overflow")?;
    let raw = data
        .get(start..end)
        .context("BNM entry stream runs past EOF")?;

    match entry.stream_type {
        StreamType::Pcm => {
            let samples: Vec<i16> = raw
                .chunks_exact(2)
                .map(|c| i16::from_le_bytes([c[0], c[1]]))
                .collect();
            Ok(samples)
        }
        StreamType::Apm => {
            let header = container::ApmHeader {
                channels: entry.channels,
                sample_rate: entry.sample_rate,
                bits_per_sample: 4,
                block_align: 0,
                sample_count: 0,
            };
            Ok(container::decode_apm_body(&header, raw)?)
        }
        StreamType::Mpdx | StreamType::Midi => {
            bail!("stream type {:?} has no decoded PCM form in this tool", entry.stream_type)
        }
    }
}

fn extract_bnm(provider: &dyn FileProvider, path: &str, dest_dir: &Path) -> Result<()> {
    let data = read_all(provider, path)?;
    let header = container::BnmHeader::parse(&data)?;
    fs::create_dir_all(dest_dir)?;

    let entries_offset = container::bnm::HEADER_LEN;
    let entry_count = header.count_0;
    let entries = container::read_bnm_entries(&data, &header, entries_offset, entry_count, 1)?;

    let mut report = BatchReport::default();
    for entry in &entries {
        match decode_bnm_entry(&data, entry) {
            Ok(samples) => {
                let wav_name = Path::new(&entry.name).with_extension("wav");
                emit::audio::write_wav(&samples, entry.channels, entry.sample_rate, &dest_dir.join(wav_name))?;
                report.record_ok();
            }
            Err(err) => {
                log::warn!("{path}/{}: {err:#}", entry.name);
                report.record_failure();
            }
        }
    }
    if report.failed > 0 && report.succeeded == 0 {
        bail!("every entry in {path} failed to decode");
    }
    Ok(())
}

fn extract_apm(provider: &dyn FileProvider, path: &str, dest: &Path) -> Result<()> {
    let data = read_all(provider, path)?;
    let header = container::ApmHeader::parse(&data)?;
    let samples = container::decode_apm_body(&header, &data[container::apm::HEADER_LEN..])?;
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    emit::audio::write_wav(&samples, header.channels, header.sample_rate, dest)?;
    Ok(())
}

fn cmd_textures(cnt: &Path, output: &Path) -> Result<i32> {
    let data = fs::read(cnt).with_context(|| format!("reading {}", cnt.display()))?;
    let archive = container::CntArchive::parse(&data)?;
    fs::create_dir_all(output)?;
    let source_is_textures_cnt = cnt.to_string_lossy().to_lowercase().contains("textures");

    let mut report = BatchReport::default();
    for entry in &archive.files {
        let result = (|| -> Result<()> {
            let raw = archive.extract(entry, &data)?;
            let mut tex = texture::decode_gf(&raw)?;
            if texture::needs_vertical_flip(source_is_textures_cnt, tex.width, tex.height) {
                texture::flip_vertical(&mut tex.rgba, tex.width, tex.height);
            }
            let png_name = Path::new(&entry.name).with_extension("png");
            emit::image::write_png(&tex, &output.join(png_name))?;
            Ok(())
        })();
        match result {
            Ok(()) => report.record_ok(),
            Err(err) => {
                log::warn!("{}: {err:#}", entry.name);
                report.record_failure();
            }
        }
    }
    log::info!("textures: {} succeeded, {} failed", report.succeeded, report.failed);
    Ok(report.exit_code())
}

fn cmd_audio(file: &Path, output: &Path) -> Result<i32> {
    let data = fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    fs::create_dir_all(output)?;

    if has_extension(&file.to_string_lossy(), "apm") {
        let header = container::ApmHeader::parse(&data)?;
        let samples = container::decode_apm_body(&header, &data[container::apm::HEADER_LEN..])?;
        let stem = file.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_else(|| "out".into());
        emit::audio::write_wav(&samples, header.channels, header.sample_rate, &output.join(format!("{stem}.wav")))?;
        return Ok(0);
    }

    let header = container::BnmHeader::parse(&data)?;
    let entries = container::read_bnm_entries(&data, &header, container::bnm::HEADER_LEN, header.count_0, 1)?;
    let mut report = BatchReport::default();
    for entry in &entries {
        match decode_bnm_entry(&data, entry) {
            Ok(samples) => {
                let wav_name = Path::new(&entry.name).with_extension("wav");
                emit::audio::write_wav(&samples, entry.channels, entry.sample_rate, &output.join(wav_name))?;
                report.record_ok();
            }
            Err(err) => {
                log::warn!("{}: {err:#}", entry.name);
                report.record_failure();
            }
        }
    }
    Ok(report.exit_code())
}

/// A level directory's three role files, discovered by extension since the
/// pack's original_source material carried no naming convention for them
/// (see DESIGN.md, "level file discovery").
struct LevelFiles {
    sna: String,
    reloc: Option<String>,
    gpt: Option<String>,
}

fn discover_level_files(provider: &dyn FileProvider) -> Result<LevelFiles> {
    let paths = provider.list()?;
    let sna = paths
        .iter()
        .find(|p| has_extension(p, "sna"))
        .cloned()
        .context("no .sna file found in level directory")?;
    const RELOC_EXTS: [&str; 7] = ["rtb", "rtp", "rtt", "rtd", "rtg", "rts", "rtv"];
    let reloc = paths
        .iter()
        .find(|p| RELOC_EXTS.iter().any(|ext| has_extension(p, ext)))
        .cloned();
    let gpt = paths.iter().find(|p| has_extension(p, "gpt")).cloned();
    Ok(LevelFiles { sna, reloc, gpt })
}

fn load_level_memory(
    provider: &dyn FileProvider,
    files: &LevelFiles,
) -> Result<hype_extract::memory::MemoryContext> {
    let sna_data = read_all(provider, &files.sna)?;
    let reloc_data = match &files.reloc {
        Some(path) => read_all(provider, path)?,
        None => vec![0u8], // empty relocation table (block_count = 0)
    };
    Ok(hype_extract::level::load_memory(
        &sna_data,
        OuterXor::NumberMaskHeader,
        &reloc_data,
        OuterXor::NumberMaskHeader,
    )?)
}

fn cmd_meshes(level_dir: &Path) -> Result<i32> {
    let provider = DirectoryProvider::new(level_dir);
    let files = discover_level_files(&provider)?;
    let memory = load_level_memory(&provider, &files)?;

    let mut found = 0usize;
    for index in 0..memory.blocks().len() {
        for (addr, mesh) in hype_extract::geometry::scan_for_geometric_objects(&memory, index) {
            println!(
                "{addr:#010x}: {} vertices, {} elements",
                mesh.num_vertices,
                mesh.elements.len()
            );
            found += 1;
        }
    }
    log::info!("meshes: {found} found");
    Ok(if found > 0 { 0 } else { 1 })
}

fn cmd_scene(level_dir: &Path) -> Result<i32> {
    let provider = DirectoryProvider::new(level_dir);
    let files = discover_level_files(&provider)?;
    let gpt_path = files
        .gpt
        .clone()
        .context("no .gpt file found in level directory")?;
    let sna_data = read_all(&provider, &files.sna)?;
    let reloc_data = match &files.reloc {
        Some(path) => read_all(&provider, path)?,
        None => vec![0u8],
    };
    let gpt_data = read_all(&provider, &gpt_path)?;

    // The GPT file is block-table-shaped like the SNA itself; its blocks are
    // merged into the same address space and the seed address comes from
    // the mapped base of its own block, not from raw file bytes.
    let level = hype_extract::level::load_level_with_gpt_file(
        &sna_data,
        OuterXor::NumberMaskHeader,
        &reloc_data,
        OuterXor::NumberMaskHeader,
        &gpt_data,
        OuterXor::NumberMaskHeader,
        &CancelToken::new(),
    )?;

    fn print_node(level: &hype_extract::level::Level, index: usize, depth: usize) {
        let node = level.scene.node(index);
        println!("{}{:#010x} {:?}", "  ".repeat(depth), node.addr, node.type_code);
        for &child in &node.children {
            print_node(level, child, depth + 1);
        }
    }
    for &root in &level.scene.roots {
        print_node(&level, root, 0);
    }
    Ok(0)
}

fn cmd_scripts(level_dir: &Path, limit: Option<usize>, raw: bool, output: Option<&Path>) -> Result<i32> {
    let provider = DirectoryProvider::new(level_dir);
    let files = discover_level_files(&provider)?;
    let memory = load_level_memory(&provider, &files)?;
    let tables = TypeTables::load_default()?;

    let mut emitted = 0usize;

    'blocks: for index in 0..memory.blocks().len() {
        for (addr, forest) in hype_extract::script::scan_for_scripts(&memory, index, &tables) {
            if let Some(max) = limit {
                if emitted >= max {
                    break 'blocks;
                }
            }
            let text = if raw {
                format!("{forest:#?}")
            } else {
                tables.emit(&forest)
            };

            match &output {
                Some(dir) => {
                    fs::create_dir_all(dir)?;
                    let name = format!("script_{addr:08x}.txt");
                    fs::write(dir.join(name), &text)?;
                }
                None => println!("; {addr:#010x}\n{text}"),
            }
            emitted += 1;
        }
    }

    log::info!("scripts: {emitted} emitted");
    Ok(if emitted > 0 { 0 } else { 1 })
}
