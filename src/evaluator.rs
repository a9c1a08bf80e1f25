//! Scoring charts with an external layout tool.
//!
//! The layout tool (`dot`) is run once per candidate with the whole chart on its stdin.
//! With `-v` it reports, among other diagnostics, a line such as
//!
//! ```text
//! mincross G: 5 crossings, 0.00 secs.
//! ```
//!
//! and the number between the colon and the `crossings` marker is the score.
use std::ffi::OsString;
use std::fmt::Display;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

#[cfg(unix)]
use std::os::unix::process::CommandExt;

use tracing::{event, instrument, Level};

use crate::error::{Error, IoErrExt, Kind};

pub const CROSSINGS_MARKER: &str = "crossings";

/// Installation directories searched when the layout tool is not on `PATH`.
pub const FALLBACK_DIRS: &[&str] = &[
    "/usr/local/bin",
    "/opt/homebrew/bin",
    "/opt/local/bin",
    "/usr/bin",
    r"C:\Program Files\Graphviz\bin",
    r"C:\Program Files (x86)\Graphviz\bin",
];

/// What the layout tool said about one chart.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Crossings {
    Reported(u32),
    /// No crossings line was found; counts as 0.
    Missing,
}

impl Crossings {
    pub fn count(self) -> u32 {
        match self {
            Crossings::Reported(n) => n,
            Crossings::Missing => 0,
        }
    }

    pub fn is_reported(self) -> bool {
        matches!(self, Crossings::Reported(_))
    }
}

impl Display for Crossings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Crossings::Reported(n) => write!(f, "{n}"),
            Crossings::Missing => write!(f, "0 (unreported)"),
        }
    }
}

/// Extract the crossing count from the first diagnostic line mentioning [CROSSINGS_MARKER].
pub fn parse_crossings(diagnostics: &str) -> Crossings {
    diagnostics
        .lines()
        .find(|l| l.contains(CROSSINGS_MARKER))
        .and_then(|line| {
            let end = line.find(CROSSINGS_MARKER)?;
            let start = line[..end].find(':')? + 1;
            line[start..end].trim().parse::<u32>().ok()
        })
        .map(Crossings::Reported)
        .unwrap_or(Crossings::Missing)
}

/// How to run the layout tool.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    /// A bare name is looked up with [locate]; anything else is used as a path.
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Output format passed as `-T<format>`; also the rendered image's extension.
    pub format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            program: PathBuf::from("dot"),
            args: vec!["-v".to_string()],
            format: "pdf".to_string(),
        }
    }
}

impl Config {
    /// The default config, with `UNCROSS_DOT` and `UNCROSS_FORMAT` applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(program) = std::env::var_os("UNCROSS_DOT") {
            config.program = PathBuf::from(program);
        }
        if let Ok(format) = std::env::var("UNCROSS_FORMAT") {
            config.format = format;
        }
        config
    }
}

pub fn locate(program: &Path) -> Result<PathBuf, Error> {
    locate_in(program, std::env::var_os("PATH"), FALLBACK_DIRS)
}

/// Resolve `program` against the directories in `path`, then against `fallback`.
pub fn locate_in(program: &Path, path: Option<OsString>, fallback: &[&str]) -> Result<PathBuf, Error> {
    let not_found = |searched: Vec<PathBuf>| Error::from(Kind::ToolNotFound {
        program: program.display().to_string(),
        searched,
    });

    if program.is_absolute() || program.components().count() > 1 {
        return if program.is_file() {
            Ok(program.to_path_buf())
        } else {
            Err(not_found(vec![]))
        };
    }

    let dirs = path
        .iter()
        .flat_map(|p| std::env::split_paths(p))
        .chain(fallback.iter().map(PathBuf::from));
    for dir in dirs {
        let candidate = dir.join(program);
        if candidate.is_file() {
            event!(Level::DEBUG, ?candidate, "LOCATED");
            return Ok(candidate);
        }
        if cfg!(windows) {
            let exe = candidate.with_extension("exe");
            if exe.is_file() {
                return Ok(exe);
            }
        }
    }
    Err(not_found(fallback.iter().map(PathBuf::from).collect()))
}

/// Something that can score a chart and render the final one.
pub trait Evaluate {
    fn crossings(&mut self, document: &str) -> Result<Crossings, Error>;

    /// Render `document` into `image`, returning the crossings reported while doing so.
    fn render(&mut self, document: &str, image: &Path) -> Result<Crossings, Error>;
}

/// The `dot` layout tool.
#[derive(Clone, Debug)]
pub struct Dot {
    program: PathBuf,
    args: Vec<String>,
    format: String,
}

impl Dot {
    /// Locate the configured program and prepare to run it.
    pub fn new(config: &Config) -> Result<Self, Error> {
        let program = locate(&config.program)?;
        Ok(Self::with_program(program, config))
    }

    /// Use `program` as given, skipping discovery.
    pub fn with_program(program: impl Into<PathBuf>, config: &Config) -> Self {
        Self {
            program: program.into(),
            args: config.args.clone(),
            format: config.format.clone(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    fn process_error(&self, source: std::io::Error) -> Error {
        Error::from(Kind::ProcessError { program: self.program.clone(), source })
    }

    /// Run the tool once. With `strict`, an unsuccessful exit is an error rather than a
    /// warning, since its output is kept.
    fn run(&self, document: &str, stdout: Stdio, strict: bool) -> Result<Crossings, Error> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(format!("-T{}", self.format))
            .stdin(Stdio::piped())
            .stdout(stdout)
            .stderr(Stdio::piped());
        // own process group: terminal signals only reach our interrupt flag
        #[cfg(unix)]
        command.process_group(0);
        let mut child = command.spawn().map_err(|e| self.process_error(e))?;

        // dropping stdin closes the pipe so the tool sees end of input
        let written = child
            .stdin
            .take()
            .map(|mut stdin| stdin.write_all(document.as_bytes()))
            .unwrap_or(Ok(()));
        if let Err(source) = written {
            let _ = child.kill();
            let _ = child.wait();
            return Err(self.process_error(source));
        }

        let output = child
            .wait_with_output()
            .map_err(|e| self.process_error(e))?;
        let diagnostics = String::from_utf8_lossy(&output.stderr);
        event!(Level::TRACE, %diagnostics, "LAYOUT DIAGNOSTICS");

        if !output.status.success() {
            if strict {
                return Err(Error::from(Kind::ToolFailed {
                    program: self.program.clone(),
                    status: output.status.to_string(),
                }));
            }
            event!(Level::WARN, program = ?self.program, status = %output.status, "layout tool exited unsuccessfully");
        }

        let crossings = parse_crossings(&diagnostics);
        if crossings == Crossings::Missing {
            event!(Level::WARN, program = ?self.program, "no crossings line in layout tool output; counting 0");
        }
        Ok(crossings)
    }
}

impl Evaluate for Dot {
    fn crossings(&mut self, document: &str) -> Result<Crossings, Error> {
        self.run(document, Stdio::null(), false)
    }

    #[instrument(skip(self, document))]
    fn render(&mut self, document: &str, image: &Path) -> Result<Crossings, Error> {
        let file = File::create(image).at_path(image)?;
        self.run(document, Stdio::from(file), true)
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parses_first_crossings_line() {
        let stderr = "dot - graphviz version 2.43.0\n\
            network simplex:  3 nodes  2 edges  1 iter 0.00 sec\n\
            mincross: pass 0 iter 0 trying 0 cur_cross 7 best_cross 7\n\
            mincross G: 5 crossings, 0.00 secs.\n\
            mincross clust_F1: 2 crossings, 0.00 secs.\n";
        assert_eq!(parse_crossings(stderr), Crossings::Reported(5));
        assert_eq!(parse_crossings("mincross G: 0 crossings, 0.00 secs."), Crossings::Reported(0));
    }

    #[test]
    fn missing_or_garbled_line_is_missing() {
        assert_eq!(parse_crossings(""), Crossings::Missing);
        assert_eq!(parse_crossings("dot - graphviz version 2.43.0\n"), Crossings::Missing);
        assert_eq!(parse_crossings("mincross G: many crossings"), Crossings::Missing);
        assert_eq!(parse_crossings("5 crossings: none"), Crossings::Missing);
        assert_eq!(Crossings::Missing.count(), 0);
        assert!(!Crossings::Missing.is_reported());
    }

    #[test]
    fn explicit_path_must_exist() {
        let err = locate_in(Path::new("/nonexistent/bin/dot"), None, FALLBACK_DIRS).unwrap_err();
        assert!(matches!(err.kind(), Kind::ToolNotFound { searched, .. } if searched.is_empty()));
    }

    #[test]
    fn searches_path_then_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("fake-dot");
        std::fs::write(&tool, "").unwrap();

        let found = locate_in(Path::new("fake-dot"), Some(dir.path().as_os_str().to_owned()), &[]).unwrap();
        assert_eq!(found, tool);

        let fallback = dir.path().to_str().unwrap();
        let found = locate_in(Path::new("fake-dot"), None, &[fallback]).unwrap();
        assert_eq!(found, tool);

        let err = locate_in(Path::new("no-such-layout-tool"), None, &[fallback]).unwrap_err();
        assert!(matches!(err.kind(), Kind::ToolNotFound { searched, .. } if searched == &vec![dir.path().to_path_buf()]));
    }

    #[test]
    fn spawn_failure_is_process_error() {
        let mut dot = Dot::with_program("/nonexistent/bin/dot", &Config::default());
        let err = dot.crossings("digraph G {}").unwrap_err();
        assert!(matches!(err.kind(), Kind::ProcessError { .. }));
    }

    #[cfg(unix)]
    fn scripted(script: &str) -> Dot {
        let config = Config {
            program: PathBuf::from("sh"),
            args: vec!["-c".to_string(), script.to_string()],
            format: "pdf".to_string(),
        };
        Dot::with_program("sh", &config)
    }

    #[cfg(unix)]
    #[test]
    fn reads_crossings_from_stderr() {
        let mut dot = scripted("cat >/dev/null; echo 'mincross G: 3 crossings, 0.01 secs.' >&2");
        assert_eq!(dot.crossings("digraph G {}").unwrap(), Crossings::Reported(3));

        let mut dot = scripted("cat >/dev/null; echo 'nothing to see' >&2");
        assert_eq!(dot.crossings("digraph G {}").unwrap(), Crossings::Missing);
    }

    #[cfg(unix)]
    #[test]
    fn renders_stdout_into_image() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let image = dir.path().join("out.pdf");
        let mut dot = scripted("cat; echo 'mincross G: 1 crossings, 0.01 secs.' >&2");
        let crossings = dot.render("digraph G {}\n", &image)?;
        assert_eq!(crossings, Crossings::Reported(1));
        assert_eq!(std::fs::read_to_string(&image)?, "digraph G {}\n");
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn failed_render_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("out.pdf");
        let mut dot = scripted("cat >/dev/null; echo 'Error: syntax error in line 1' >&2; exit 1");
        let err = dot.render("digraph G {", &image).unwrap_err();
        assert!(matches!(err.kind(), Kind::ToolFailed { status, .. } if status.contains('1')));

        // a failing trial is only scored as missing
        assert_eq!(dot.crossings("digraph G {").unwrap(), Crossings::Missing);
    }

    #[cfg(unix)]
    #[test]
    fn unread_input_kills_the_tool() {
        let mut dot = scripted("exit 0");
        let err = dot.crossings(&"x".repeat(4 << 20)).unwrap_err();
        assert!(matches!(err.kind(), Kind::ProcessError { .. }));
    }
}
