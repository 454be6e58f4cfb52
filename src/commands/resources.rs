//! `deploy`, `delete` and `describe`

use crate::context::Context;
use crate::engine::{self, Session};
use crate::resource::{Document, Kind, parse_documents};
use crate::ui;
use anyhow::{Context as _, Result, bail};
use executor::{Mode, NoObserver};
use std::fs;
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;

/// Read a resource file, or stdin for `-`
pub fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut input = String::new();
        io::stdin()
            .read_to_string(&mut input)
            .context("Failed to read resources from stdin")?;
        return Ok(input);
    }
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn run(ctx: &Context, mode: Mode, file: &Path, verb: &str) -> Result<()> {
    let documents = parse_documents(&read_input(file)?, &ctx.namespace)?;
    let session = Arc::new(Session::from_context(ctx));
    let report = engine::execute(mode, &session, &documents, &ui::UiObserver::new(ctx.quiet))?;

    ui::summary(verb, &report);
    if !report.is_success() {
        bail!("{} failed for {} resource(s)", verb, report.failed.len());
    }
    Ok(())
}

pub fn deploy(ctx: &Context, file: &Path) -> Result<()> {
    run(ctx, Mode::Apply, file, "Deploy")
}

pub fn delete(ctx: &Context, file: &Path) -> Result<()> {
    run(ctx, Mode::Delete, file, "Delete")
}

pub fn describe(ctx: &Context, kind: &str, name: &str) -> Result<()> {
    let kind = Kind::lookup(kind).with_context(|| {
        let known: Vec<&str> = Kind::ALL.iter().map(|k| k.as_str()).collect();
        format!("Unknown kind {}. Known kinds: {}", kind, known.join(", "))
    })?;
    let session = Arc::new(Session::from_context(ctx));
    let document = Document::reference(kind.as_str(), name);
    let report = engine::execute(Mode::Describe, &session, &[document], &NoObserver)?;
    if let Some(failure) = report.failed.into_iter().next() {
        return Err(failure.error);
    }

    for envelope in session.described() {
        print!("{}", envelope.to_yaml()?);
    }
    Ok(())
}
