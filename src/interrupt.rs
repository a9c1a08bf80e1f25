//! Cooperative cancellation and writing the final artifacts.
//!
//! A signal only sets a flag. The optimizer reads that flag before each trial, so the
//! state handed to the [Finalizer] is always one that was fully scored.
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use signal_hook::consts::{SIGINT, SIGTERM};
use tracing::{event, Level};

use crate::error::{Error, IoErrExt, Kind};
use crate::evaluator::{Crossings, Evaluate};
use crate::optimizer::Optimizer;

#[derive(Clone, Debug, Default)]
pub struct Interrupt {
    raised: Arc<AtomicBool>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise this interrupt on SIGINT or SIGTERM.
    pub fn install() -> Result<Self, Error> {
        let interrupt = Self::new();
        for signal in [SIGINT, SIGTERM] {
            signal_hook::flag::register(signal, Arc::clone(&interrupt.raised))
                .map_err(|source| Error::from(Kind::SignalError { source }))?;
        }
        Ok(interrupt)
    }

    /// Idempotent: raising twice is the same as raising once.
    pub fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }
}

/// Where the reordered source and the rendered image are written.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Artifacts {
    pub source: PathBuf,
    pub image: PathBuf,
}

impl Artifacts {
    /// `dir/name.ext` becomes `dir/name-uncrossed.ext` and `dir/name-uncrossed.<format>`.
    pub fn for_input(input: &Path, format: &str) -> Self {
        let stem = input.file_stem().unwrap_or_else(|| OsStr::new("chart")).to_string_lossy();
        let ext = input.extension().map(|e| e.to_string_lossy()).unwrap_or_else(|| "gv".into());
        let dir = input.parent().unwrap_or_else(|| Path::new(""));
        Self {
            source: dir.join(format!("{stem}-uncrossed.{ext}")),
            image: dir.join(format!("{stem}-uncrossed.{format}")),
        }
    }
}

/// Writes the artifacts for the best ordering, once.
#[derive(Debug)]
pub struct Finalizer {
    artifacts: Artifacts,
    done: bool,
}

impl Finalizer {
    pub fn new(artifacts: Artifacts) -> Self {
        Self { artifacts, done: false }
    }

    pub fn artifacts(&self) -> &Artifacts {
        &self.artifacts
    }

    /// Write the reordered source and render it. Returns `None` if already finalized.
    pub fn finalize<E: Evaluate>(&mut self, optimizer: &mut Optimizer<'_, '_, E>) -> Result<Option<Crossings>, Error> {
        if self.done {
            event!(Level::DEBUG, "already finalized");
            return Ok(None);
        }
        self.done = true;

        let state = optimizer.snapshot();
        let text = optimizer.document().assemble_with(&state.best_ordering);

        let Artifacts { source, image } = &self.artifacts;
        std::fs::write(source, &text).at_path(source)?;
        event!(Level::INFO, ?source, "WROTE SOURCE");

        let rendered = optimizer.evaluator_mut().render(&text, image)?;
        event!(Level::INFO, ?image, %rendered, "RENDERED");
        Ok(Some(rendered))
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::document::{parse, test::CHART};
    use crate::optimizer::test::{inversions, Scripted};

    #[test]
    fn clones_share_the_flag() {
        let interrupt = Interrupt::new();
        let other = interrupt.clone();
        assert!(!interrupt.is_raised());
        other.raise();
        other.raise();
        assert!(interrupt.is_raised());
    }

    #[test]
    fn artifact_names_follow_input() {
        let artifacts = Artifacts::for_input(Path::new("charts/smith.gv"), "pdf");
        assert_eq!(artifacts.source, Path::new("charts/smith-uncrossed.gv"));
        assert_eq!(artifacts.image, Path::new("charts/smith-uncrossed.pdf"));

        let artifacts = Artifacts::for_input(Path::new("smith"), "svg");
        assert_eq!(artifacts.source, Path::new("smith-uncrossed.gv"));
        assert_eq!(artifacts.image, Path::new("smith-uncrossed.svg"));
    }

    #[test]
    fn writes_best_ordering_once() {
        let dir = tempfile::tempdir().unwrap();
        let doc = parse(CHART).unwrap();
        let p = &doc.people;
        let target = vec![p[1], p[0], p[2], p[3]];
        let t = target.clone();
        let evaluator = Scripted::new(move |d: &str| Ok(Crossings::Reported(inversions(d, &t))));
        let mut optimizer = Optimizer::new(&doc, evaluator).unwrap();
        optimizer.run(&Interrupt::new());

        let mut finalizer = Finalizer::new(Artifacts::for_input(&dir.path().join("chart.gv"), "pdf"));
        let rendered = finalizer.finalize(&mut optimizer).unwrap();
        assert_eq!(rendered, Some(Crossings::Reported(0)));
        assert_eq!(finalizer.finalize(&mut optimizer).unwrap(), None);

        let written = std::fs::read_to_string(&finalizer.artifacts().source).unwrap();
        assert_eq!(written, doc.assemble_with(&target));

        let renders = &optimizer.evaluator_mut().renders;
        assert_eq!(renders.len(), 1);
        assert_eq!(renders[0].0, written);
        assert_eq!(renders[0].1, dir.path().join("chart-uncrossed.pdf"));
    }

    #[test]
    fn unwritable_source_is_io_error() {
        let doc = parse(CHART).unwrap();
        let mut optimizer = Optimizer::new(&doc, Scripted::new(|_: &str| Ok(Crossings::Reported(1)))).unwrap();
        let mut finalizer = Finalizer::new(Artifacts::for_input(Path::new("/nonexistent/dir/chart.gv"), "pdf"));
        let err = finalizer.finalize(&mut optimizer).unwrap_err();
        assert!(matches!(err.kind(), Kind::IoError { .. }));
        assert!(optimizer.evaluator_mut().renders.is_empty());
    }
}
