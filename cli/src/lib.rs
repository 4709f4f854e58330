use aff4::consts::{ASSERTS, AUTHORITY, CONTACT, ORIGINAL_FILE_NAME, SIGNED_AT};
use aff4::integrity::verify_container;
use aff4::map::load_points;
use aff4::provenance::{
    authorities, warrants, AssertionStatus, Authority, CryptoContext, SignatureStatus, Warrant,
};
use aff4::{Container, ContainerConfig, Object, QuadStore, RandomRead, StreamKind};
use aff4_bevy::{BlobStore, Compression, DigestMethod, DirectoryStore, ReadOutcome};
use anyhow::{anyhow, bail, Context, Error, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{info, warn};
use pretty_bytes::converter::convert;
use serde_json::json;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

const BLOCK: usize = 1 << 20;

#[derive(Debug, Parser)]
#[command(name = "aff4")]
#[command(about = "Forensic evidence container tool")]
#[command(arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Verbose mode - sets the RUST_LOG level to info, defaults to warning level
    #[clap(long, short, action, default_value = "false", global = true)]
    verbose: bool,
    /// Debug mode - sets the RUST_LOG level to debug, defaults to warning level
    #[clap(long, action, default_value = "false", global = true)]
    debug: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CompressionArg {
    Deflate,
    Stored,
}

impl From<CompressionArg> for Compression {
    fn from(arg: CompressionArg) -> Self {
        match arg {
            CompressionArg::Deflate => Compression::Deflate,
            CompressionArg::Stored => Compression::Stored,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DigestArg {
    Md5,
    Sha256,
    Blake3,
}

impl From<DigestArg> for DigestMethod {
    fn from(arg: DigestArg) -> Self {
        match arg {
            DigestArg::Md5 => DigestMethod::Md5,
            DigestArg::Sha256 => DigestMethod::Sha256,
            DigestArg::Blake3 => DigestMethod::Blake3,
        }
    }
}

/// Settings for newly written streams. Flags override the config file.
#[derive(Debug, Args)]
struct StreamOptions {
    /// JSON container configuration file
    #[clap(long)]
    config: Option<PathBuf>,
    /// Logical chunk size in bytes
    #[clap(long)]
    chunk_size: Option<u32>,
    /// Number of chunks per bevy segment
    #[clap(long)]
    chunks_per_segment: Option<u32>,
    /// Per-chunk compression
    #[clap(long, value_enum)]
    compression: Option<CompressionArg>,
    /// Content digest recorded for each image stream
    #[clap(long, value_enum)]
    digest: Option<DigestArg>,
}

impl StreamOptions {
    fn load(&self) -> Result<ContainerConfig> {
        let mut config = match &self.config {
            Some(file) => ContainerConfig::from_file(file)
                .with_context(|| format!("reading config {}", file.display()))?,
            None => ContainerConfig::default(),
        };
        if let Some(n) = self.chunk_size {
            config.chunk_size = n;
        }
        if let Some(n) = self.chunks_per_segment {
            config.chunks_per_segment = n;
        }
        if let Some(c) = self.compression {
            config.compression = c.into();
        }
        if let Some(d) = self.digest {
            config.content_digest = d.into();
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Image one or more files into a directory container, creating it if needed
    Acquire {
        /// Container directory
        container: PathBuf,
        /// Files to image, one image stream each
        #[clap(required = true)]
        inputs: Vec<PathBuf>,
        /// Also stitch all inputs, in order, into one logical map stream
        #[clap(long, action, default_value = "false")]
        map: bool,
        /// URN of the map stream; generated when omitted
        #[clap(long, requires = "map")]
        map_urn: Option<String>,
        #[command(flatten)]
        options: StreamOptions,
    },
    /// Describe the streams, maps, authorities and warrants in a container
    Info {
        /// Container directory
        container: PathBuf,
        /// Output JSON instead of text
        #[clap(long, action, default_value = "false")]
        json: bool,
    },
    /// Copy the logical bytes of a stream or map to a file
    Export {
        /// Container directory
        container: PathBuf,
        /// URN of the image stream or map
        stream: String,
        /// Destination file
        output: PathBuf,
        /// Write zeros for unreadable map regions instead of failing
        #[clap(long, action, default_value = "false")]
        fill: bool,
    },
    /// Check every stream digest and warrant; exits non-zero on any failure
    Verify {
        /// Container directory
        container: PathBuf,
    },
    /// Issue a signed warrant over graphs of a container
    Sign {
        /// Container directory
        container: PathBuf,
        /// PEM private key of the signing authority
        #[clap(long)]
        key: PathBuf,
        /// URN of the signing authority
        #[clap(long)]
        authority: String,
        /// Contact address, required the first time an authority signs
        #[clap(long)]
        contact: Option<String>,
        /// URN of the new warrant; generated when omitted
        #[clap(long)]
        warrant: Option<String>,
        /// Graphs to assert; defaults to the volume graph
        #[clap(long = "graph", num_args = 1..)]
        graphs: Vec<String>,
    },
    /// Generate an RSA key pair for signing
    Keygen {
        /// Private key output (PEM); the public key goes to `<OUTPUT>.pub`
        output: PathBuf,
        /// Modulus size in bits
        #[clap(long, default_value = "2048")]
        bits: usize,
    },
    /// Print the effective container configuration as JSON
    Config {
        /// Save to this file instead of printing
        #[clap(long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        options: StreamOptions,
    },
    /// Prints the version of the aff4 binary
    Version,
}

pub fn run() -> Result<()> {
    let cmd = Cli::parse();
    execute(cmd)
}

pub fn run_from_args<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cmd = Cli::try_parse_from(args).map_err(Error::from)?;
    execute(cmd)
}

fn execute(cmd: Cli) -> Result<()> {
    // CLI flags take precedence over RUST_LOG; with neither, default to "warn".
    if cmd.debug {
        std::env::set_var("RUST_LOG", "debug");
    } else if cmd.verbose {
        std::env::set_var("RUST_LOG", "info");
    } else if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "warn");
    }
    let _ = env_logger::try_init();

    match cmd.command {
        Commands::Acquire {
            container,
            inputs,
            map,
            map_urn,
            options,
        } => {
            let config = options.load()?;
            acquire(&container, &inputs, map, map_urn, config)
        }
        Commands::Info { container, json } => show_info(&container, json),
        Commands::Export {
            container,
            stream,
            output,
            fill,
        } => export(&container, &stream, &output, fill),
        Commands::Verify { container } => verify(&container),
        Commands::Sign {
            container,
            key,
            authority,
            contact,
            warrant,
            graphs,
        } => sign(&container, &key, &authority, contact, warrant, graphs),
        Commands::Keygen { output, bits } => keygen(&output, bits),
        Commands::Config { output, options } => {
            let config = options.load()?;
            match output {
                Some(file) => {
                    config.save_to_file(&file)?;
                    println!("Wrote {}", file.display());
                }
                None => println!("{}", serde_json::to_string_pretty(&config)?),
            }
            Ok(())
        }
        Commands::Version => {
            println!("aff4 {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Open `path` for writing, creating a new volume when it holds no metadata yet.
fn open_for_writing(path: &Path, config: ContainerConfig) -> Result<Container<DirectoryStore>> {
    let store = DirectoryStore::create(path)
        .with_context(|| format!("opening {} for writing", path.display()))?;
    if store.contains(&config.metadata_segment)? {
        Ok(Container::open_with_config(store, config)?)
    } else {
        info!("Creating new container at {}", path.display());
        Ok(Container::create(store, config)?)
    }
}

fn open_for_reading(path: &Path) -> Result<Container<DirectoryStore>> {
    let store = DirectoryStore::open(path)
        .with_context(|| format!("opening container {}", path.display()))?;
    Ok(Container::open(store)?)
}

fn acquire(
    path: &Path,
    inputs: &[PathBuf],
    map: bool,
    map_urn: Option<String>,
    config: ContainerConfig,
) -> Result<()> {
    let mut container = open_for_writing(path, config)?;
    let volume = container.volume().to_string();
    let mut acquired = Vec::with_capacity(inputs.len());
    for input in inputs {
        let file = File::open(input).with_context(|| format!("opening {}", input.display()))?;
        let mut reader = BufReader::with_capacity(BLOCK, file);
        let mut writer = container.new_image_stream()?;
        io::copy(&mut reader, &mut writer)?;
        let stream = writer.close()?;
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| input.display().to_string());
        container.graph_mut().insert(
            &volume,
            &stream.urn,
            ORIGINAL_FILE_NAME,
            Object::literal(name.as_str()),
        );
        println!(
            "{}  {}  {}  {}",
            stream.urn,
            convert(stream.size as f64),
            stream.digest,
            input.display()
        );
        acquired.push(stream);
    }

    if map {
        let mut writer = match map_urn {
            Some(urn) => container.new_map_named(urn)?,
            None => container.new_map()?,
        };
        for stream in acquired.iter().filter(|s| s.size > 0) {
            writer.map_range(stream.size, &stream.urn, 0)?;
        }
        let map = writer.close()?;
        println!(
            "{}  {}  map of {} stream(s)",
            map.urn,
            convert(map.size as f64),
            acquired.len()
        );
    }
    container.close()?;
    Ok(())
}

fn compression_name(compression: Compression) -> &'static str {
    match compression {
        Compression::Deflate => "deflate",
        Compression::Stored => "stored",
    }
}

fn digest_name(method: DigestMethod) -> &'static str {
    match method {
        DigestMethod::Md5 => "md5",
        DigestMethod::Sha256 => "sha256",
        DigestMethod::Blake3 => "blake3",
    }
}

fn literal_value<'a>(graph: &'a QuadStore, subject: &str, predicate: &str) -> Option<&'a str> {
    match graph.value(None, subject, predicate) {
        Ok(Some(Object::Literal(lit))) => Some(lit.value.as_str()),
        _ => None,
    }
}

fn show_info(path: &Path, as_json: bool) -> Result<()> {
    let container = open_for_reading(path)?;
    let graph = container.graph();

    let mut streams = Vec::new();
    for urn in container.image_streams() {
        let stream = container.image_stream_info(&urn)?;
        streams.push(json!({
            "urn": stream.urn,
            "size": stream.size,
            "chunk_size": stream.params.chunk_size,
            "chunks_per_segment": stream.params.chunks_per_segment,
            "compression": compression_name(stream.params.compression),
            "digest_method": digest_name(stream.digest_method),
            "digest": stream.digest,
            "original_file_name": literal_value(graph, &urn, ORIGINAL_FILE_NAME),
        }));
    }

    let mut maps = Vec::new();
    for urn in container.maps() {
        let (size, points) = load_points(graph, &urn)?;
        let known: u64 = points
            .iter()
            .filter(|p| !p.is_unknown())
            .map(|p| p.length)
            .sum();
        maps.push(json!({
            "urn": urn,
            "size": size,
            "points": points.len(),
            "unknown_bytes": size - known,
        }));
    }

    let identities: Vec<_> = authorities(&container)
        .into_iter()
        .map(|urn| {
            let contact = literal_value(graph, &urn, CONTACT);
            json!({ "urn": urn, "contact": contact })
        })
        .collect();

    let signed: Vec<_> = warrants(&container)
        .into_iter()
        .map(|urn| {
            let authority = graph
                .value(Some(urn.as_str()), &urn, AUTHORITY)
                .ok()
                .flatten()
                .and_then(Object::as_resource)
                .map(str::to_string);
            let asserted: Vec<_> = graph
                .objects(Some(urn.as_str()), &urn, ASSERTS)
                .into_iter()
                .filter_map(Object::as_resource)
                .map(str::to_string)
                .collect();
            let signed_at = literal_value(graph, &urn, SIGNED_AT).map(str::to_string);
            json!({
                "urn": urn,
                "authority": authority,
                "signed_at": signed_at,
                "asserts": asserted,
            })
        })
        .collect();

    if as_json {
        let doc = json!({
            "volume": container.volume(),
            "image_streams": streams,
            "maps": maps,
            "authorities": identities,
            "warrants": signed,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    println!("Volume: {}", container.volume());
    println!("Image streams: {}", streams.len());
    for s in &streams {
        println!(
            "  {}  {}  {} x {}  {}:{}{}",
            s["urn"].as_str().unwrap_or_default(),
            convert(s["size"].as_u64().unwrap_or_default() as f64),
            s["chunk_size"],
            s["compression"].as_str().unwrap_or_default(),
            s["digest_method"].as_str().unwrap_or_default(),
            s["digest"].as_str().unwrap_or_default(),
            s["original_file_name"]
                .as_str()
                .map(|n| format!("  ({n})"))
                .unwrap_or_default(),
        );
    }
    println!("Maps: {}", maps.len());
    for m in &maps {
        println!(
            "  {}  {}  {} point(s), {} unknown",
            m["urn"].as_str().unwrap_or_default(),
            convert(m["size"].as_u64().unwrap_or_default() as f64),
            m["points"],
            convert(m["unknown_bytes"].as_u64().unwrap_or_default() as f64),
        );
    }
    println!("Authorities: {}", identities.len());
    for a in &identities {
        println!(
            "  {}  <{}>",
            a["urn"].as_str().unwrap_or_default(),
            a["contact"].as_str().unwrap_or_default()
        );
    }
    println!("Warrants: {}", signed.len());
    for w in &signed {
        println!(
            "  {}  by {}  at {}  asserting {} graph(s)",
            w["urn"].as_str().unwrap_or_default(),
            w["authority"].as_str().unwrap_or("?"),
            w["signed_at"].as_str().unwrap_or("?"),
            w["asserts"].as_array().map_or(0, Vec::len),
        );
    }
    Ok(())
}

/// Copy `length` bytes starting at `offset`; returns how many were available.
fn copy_range(
    reader: &mut dyn RandomRead,
    offset: u64,
    length: u64,
    out: &mut impl Write,
) -> Result<u64> {
    let end = offset + length;
    let mut pos = offset;
    let mut buf = vec![0u8; BLOCK];
    while pos < end {
        let want = (end - pos).min(BLOCK as u64) as usize;
        match reader.read_at(pos, &mut buf[..want])? {
            ReadOutcome::Data(0) | ReadOutcome::EndOfStream => break,
            ReadOutcome::Data(n) => {
                out.write_all(&buf[..n])?;
                pos += n as u64;
            }
        }
    }
    Ok(pos - offset)
}

fn zeros(length: u64, out: &mut impl Write) -> Result<()> {
    io::copy(&mut io::repeat(0).take(length), out)?;
    Ok(())
}

fn export(path: &Path, urn: &str, output: &Path, fill: bool) -> Result<()> {
    let container = open_for_reading(path)?;
    let kind = container.stream_kind(urn)?;
    let mut out = BufWriter::new(
        File::create(output).with_context(|| format!("creating {}", output.display()))?,
    );

    let written = if fill && kind == StreamKind::Map {
        let (size, points) = load_points(container.graph(), urn)?;
        let mut reader = container.open_map(urn)?;
        let mut pos = 0;
        let mut filled = 0;
        for point in &points {
            if point.offset > pos {
                zeros(point.offset - pos, &mut out)?;
                filled += point.offset - pos;
            }
            if point.is_unknown() {
                zeros(point.length, &mut out)?;
                filled += point.length;
            } else {
                let n = copy_range(&mut reader, point.offset, point.length, &mut out)?;
                if n < point.length {
                    bail!("{} ended early at offset {}", urn, point.offset + n);
                }
            }
            pos = point.end();
        }
        if size > pos {
            zeros(size - pos, &mut out)?;
            filled += size - pos;
        }
        if filled > 0 {
            warn!("{} bytes of {} are unknown and were written as zeros", filled, urn);
        }
        size
    } else {
        let mut reader = container.open_stream(urn)?;
        let size = reader.size();
        copy_range(&mut *reader, 0, size, &mut out)?
    };
    out.flush()?;
    println!("Wrote {} ({}) to {}", urn, convert(written as f64), output.display());
    Ok(())
}

fn verify(path: &Path) -> Result<()> {
    let container = open_for_reading(path)?;
    let report = verify_container(&container);
    for stream in &report.streams {
        if stream.is_ok() {
            println!("OK      {}", stream.urn);
        } else if let Some(error) = &stream.error {
            println!("FAILED  {}  {}", stream.urn, error);
        } else {
            println!(
                "FAILED  {}  expected {} got {}",
                stream.urn,
                stream.expected.as_deref().unwrap_or("?"),
                stream.actual.as_deref().unwrap_or("?"),
            );
        }
    }
    for warrant in &report.warrants {
        let by = warrant.authority.as_deref().unwrap_or("?");
        match &warrant.signature {
            SignatureStatus::Valid => println!("SIGNED  {}  by {}", warrant.warrant, by),
            SignatureStatus::Invalid => {
                println!("FAILED  {}  bad signature by {}", warrant.warrant, by)
            }
            SignatureStatus::Unverifiable(reason) => {
                println!("FAILED  {}  unverifiable: {}", warrant.warrant, reason)
            }
        }
        for assertion in &warrant.assertions {
            match &assertion.status {
                AssertionStatus::Match => println!("  OK      {}", assertion.graph),
                AssertionStatus::Mismatch { .. } => {
                    println!("  CHANGED {}", assertion.graph)
                }
                AssertionStatus::Malformed(reason) => {
                    println!("  FAILED  {}  {}", assertion.graph, reason)
                }
            }
        }
    }
    if !report.is_ok() {
        bail!("verification of {} failed", path.display());
    }
    Ok(())
}

fn sign(
    path: &Path,
    key: &Path,
    authority: &str,
    contact: Option<String>,
    warrant: Option<String>,
    graphs: Vec<String>,
) -> Result<()> {
    let pem = fs::read(key).with_context(|| format!("reading key {}", key.display()))?;
    let store = DirectoryStore::create(path)
        .with_context(|| format!("opening {} for writing", path.display()))?;
    let mut container = Container::open(store)?;

    let signer = if authorities(&container).iter().any(|a| a == authority) {
        Authority::resume(&container, authority, &pem)?
    } else {
        let contact = contact
            .ok_or_else(|| anyhow!("--contact is required the first time {} signs", authority))?;
        let mut signer = Authority::from_private_pem(authority, contact, &pem)?;
        signer.close(&mut container)?;
        signer
    };

    let graphs = if graphs.is_empty() {
        vec![container.volume().to_string()]
    } else {
        graphs
    };
    let urn = warrant.unwrap_or_else(Container::<DirectoryStore>::new_urn);
    let mut warrant = Warrant::new(urn.as_str(), &signer)?;
    for graph in &graphs {
        warrant.assert_graph(&mut container, graph)?;
    }
    warrant.close(&mut container)?;
    container.close()?;
    println!("{}  signed by {}  asserting {} graph(s)", urn, authority, graphs.len());
    Ok(())
}

fn keygen(output: &Path, bits: usize) -> Result<()> {
    let crypto = CryptoContext::generate(bits)?;
    let mut public = output.as_os_str().to_owned();
    public.push(".pub");
    let public = PathBuf::from(public);
    fs::write(output, crypto.private_pem()?)
        .with_context(|| format!("writing {}", output.display()))?;
    fs::write(&public, crypto.public_pem()?)
        .with_context(|| format!("writing {}", public.display()))?;
    println!("Wrote {} and {}", output.display(), public.display());
    Ok(())
}
