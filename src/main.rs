use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use leb_cbt::heap::{node_bit_offset, node_bit_width};
use leb_cbt::{
    executor, Backend, HeapUploader, MemoryDevice, Mode, Node, Stage, Subdivision,
    SubdivisionConfig, Tree, TreeConfig, TreeExecutor,
};

#[derive(Parser, Debug)]
#[command(name = "leb-cbt", about = "Concurrent binary tree and longest-edge bisection tools")]
struct Cli {
    /// Log at debug level (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Refine around a target point and upload the result.
    Refine {
        /// Deepest subdivision level.
        #[arg(long, default_value_t = 12)]
        max_depth: u32,
        /// Initial uniform subdivision level.
        #[arg(long, default_value_t = 1)]
        init_depth: u32,
        /// Target point in the unit square.
        #[arg(long, num_args = 2, value_names = ["X", "Y"], default_values_t = [0.25, 0.25])]
        target: Vec<f32>,
        /// Subdivision scheme.
        #[arg(long, value_enum, default_value_t = ModeArg::Triangle)]
        mode: ModeArg,
        /// Executor backend.
        #[arg(long, value_enum, default_value_t = BackendArg::Host)]
        backend: BackendArg,
        /// Number of alternating split/merge passes.
        #[arg(long, default_value_t = 24)]
        passes: u32,
    },
    /// Print the leaves of a uniformly subdivided tree.
    Leaves {
        /// Deepest subdivision level.
        #[arg(long, default_value_t = 4)]
        max_depth: u32,
        /// Uniform subdivision level.
        #[arg(long, default_value_t = 2)]
        depth: u32,
    },
    /// Print the heap layout for a max depth.
    Layout {
        /// Deepest subdivision level.
        #[arg(long, default_value_t = 8)]
        max_depth: u32,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Triangle,
    Square,
}

impl From<ModeArg> for Mode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Triangle => Mode::Triangle,
            ModeArg::Square => Mode::Square,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum BackendArg {
    Host,
    Device,
}

impl From<BackendArg> for Backend {
    fn from(backend: BackendArg) -> Self {
        match backend {
            BackendArg::Host => Backend::Host,
            BackendArg::Device => Backend::Device,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Refine {
            max_depth,
            init_depth,
            target,
            mode,
            backend,
            passes,
        } => {
            let tree = TreeConfig::new(max_depth, init_depth).context("invalid tree size")?;
            let config = SubdivisionConfig::default()
                .with_tree(tree)
                .with_mode(mode.into())
                .with_backend(backend.into())
                .with_target(target[0], target[1])
                .with_max_passes(passes);
            run_refine(&config)?
        }
        Commands::Leaves { max_depth, depth } => run_leaves(max_depth, depth)?,
        Commands::Layout { max_depth } => run_layout(max_depth)?,
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_refine(config: &SubdivisionConfig) -> Result<()> {
    config.validate().context("invalid subdivision settings")?;

    let mut executor = executor::from_config(config).context("failed to build executor")?;
    let mut subdivision = Subdivision::from_config(config);
    info!(
        backend = %config.backend,
        mode = ?config.mode,
        max_depth = config.tree.max_depth,
        "refining"
    );

    for (pass, report) in subdivision
        .run(executor.as_mut(), config.max_passes)
        .into_iter()
        .enumerate()
    {
        println!(
            "pass {:>3}: visited {:>8}  mutations {:>8}  leaves {:>8}",
            pass + 1,
            report.visited,
            report.mutations,
            report.node_count
        );
    }

    let heap = executor.read_heap();
    if config.backend == Backend::Host {
        let mut device = MemoryDevice::new(heap.len());
        let mut uploader = HeapUploader::new(heap.len(), Stage::VertexShader);
        uploader.begin_frame();
        let command = uploader
            .upload(heap, &mut device)
            .context("heap upload failed")?;
        uploader
            .begin_read(Stage::VertexShader)
            .context("device heap not readable")?;
        println!(
            "uploaded {} bytes ({:?} -> {:?})",
            command.byte_size, command.barrier.src, command.barrier.dst
        );
    } else {
        println!("device heap: {} bytes", heap.len());
    }

    let readback = Tree::from_heap_words(executor.tree().heap_words().to_vec())
        .context("heap failed validation")?;
    println!("leaves: {}", readback.node_count());
    Ok(())
}

fn run_leaves(max_depth: u32, depth: u32) -> Result<()> {
    let tree = Tree::new(max_depth, depth).context("failed to build tree")?;
    for (handle, node) in tree.leaves().enumerate() {
        println!("{:>6} {}", handle, node);
    }
    Ok(())
}

fn run_layout(max_depth: u32) -> Result<()> {
    let tree = Tree::new(max_depth, 0).context("failed to build tree")?;
    println!(
        "max depth {}: {} bytes ({} words)",
        max_depth,
        tree.heap_bytes().len(),
        tree.heap_words().len()
    );
    for depth in 0..=max_depth {
        let first = Node::new(1u64 << depth, depth);
        println!(
            "depth {:>2}: {:>2} bits/node, first bit {}",
            depth,
            node_bit_width(first, max_depth),
            node_bit_offset(first, max_depth)
        );
    }
    Ok(())
}
