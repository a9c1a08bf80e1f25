use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use miette::{Diagnostic, IntoDiagnostic, Result};
use tracing::{event, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use uncross::document::parse;
use uncross::error::{Error, Kind};
use uncross::evaluator::{Config, Dot};
use uncross::interrupt::{Artifacts, Finalizer, Interrupt};
use uncross::optimizer::{Optimizer, Outcome};

/// Reorder the people in a relationship chart so that `dot` draws fewer edge crossings.
///
/// Ctrl-C stops the search early; the best ordering found so far is still written.
#[derive(Parser, Debug)]
#[clap(name = "uncross", version, about)]
pub struct Args {
    /// The chart to reorder (a Graphviz `dot` file).
    input: PathBuf,
}

#[derive(Debug, Diagnostic, thiserror::Error)]
pub enum CliError {
    #[error("cannot read {path:?}")]
    #[diagnostic(code(uncross::io_error))]
    IoError {
        path: PathBuf,
        #[source] source: std::io::Error,
    },
    #[error("cannot parse chart")]
    #[diagnostic(
        code(uncross::parse_error),
        help("the header must contain a node attribute line such as `node [style=filled];`")
    )]
    ParseError {
        #[source] source: Error,
    },
    #[error("cannot find the layout tool")]
    #[diagnostic(
        code(uncross::tool_not_found),
        help("install Graphviz, or set UNCROSS_DOT to the path of the dot executable")
    )]
    ToolNotFound {
        #[source] source: Error,
    },
    #[error("uncross failed")]
    #[diagnostic(code(uncross::error))]
    Other {
        #[source] source: Error,
    },
}

impl From<Error> for CliError {
    fn from(source: Error) -> Self {
        match source.kind() {
            Kind::MissingMarker { .. } => CliError::ParseError { source },
            Kind::ToolNotFound { .. } => CliError::ToolNotFound { source },
            _ => CliError::Other { source },
        }
    }
}

fn run(args: &Args) -> Result<(), CliError> {
    let started = Instant::now();
    let data = std::fs::read_to_string(&args.input)
        .map_err(|source| CliError::IoError { path: args.input.clone(), source })?;

    let document = parse(&data)?;
    event!(
        Level::INFO,
        people = document.people.len(),
        edges = document.edges.len(),
        groups = document.groups.len(),
        families = document.families.len(),
        "PARSED"
    );

    let config = Config::from_env();
    let dot = Dot::new(&config)?;
    event!(Level::INFO, program = ?dot.program(), format = dot.format(), "LAYOUT TOOL");

    let interrupt = Interrupt::install()?;
    let mut optimizer = Optimizer::new(&document, dot)?.started_at(started);

    if optimizer.run(&interrupt) == Outcome::Cancelled {
        event!(Level::WARN, "interrupted; writing the best ordering found so far");
    }

    // signals arriving from here on only set the flag again
    let mut finalizer = Finalizer::new(Artifacts::for_input(&args.input, &config.format));
    finalizer.finalize(&mut optimizer)?;

    let Artifacts { source, image } = finalizer.artifacts();
    println!("{}", optimizer.report());
    println!("Wrote {} and {}", source.display(), image.display());
    Ok(())
}

pub fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .context_lines(2)
                .build(),
        )
    }))
    .into_diagnostic()?;

    tracing_subscriber::Registry::default()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_error::ErrorLayer::default())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    run(&args)?;
    Ok(())
}
