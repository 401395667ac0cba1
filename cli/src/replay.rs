//! `aqueduct replay`: feed a recorded host message log to a session.
//!
//! Each non-blank line of the log is one host message. Lines starting with `#` are
//! comments. After every message the render driver is synced, so mounts and remounts
//! show up in the order they would in a live view. Outgoing backend calls are printed
//! as JSON lines as soon as they are delivered.

use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

use aqueduct::driver::{MountTarget, RenderDriver, Surface};
use aqueduct::logging;
use aqueduct::{
    Backend, BackendError, CallbackId, ComputedId, Markup, ModelId, Session, SessionConfig,
};
use clap::Args;
use color_eyre::eyre::{Result, WrapErr, eyre};
use console::style;
use futures::FutureExt;
use futures::future::LocalBoxFuture;
use serde_json::{Value, json};
use tracing::{debug, warn};

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// JSON-lines file of host messages
    pub file: PathBuf,

    /// Session configuration (TOML); defaults to `AQUEDUCT_*` environment variables
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Assemble children eagerly instead of printing deferred placeholders
    #[arg(long)]
    pub eager: bool,

    /// Simulated user input applied after the log, as `<model>=<json>`
    #[arg(long = "input", value_name = "MODEL=JSON", value_parser = parse_input)]
    pub inputs: Vec<(ModelId, Value)>,
}

fn parse_input(raw: &str) -> Result<(ModelId, Value), String> {
    let (model, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected <model>=<json>, got `{raw}`"))?;
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| Value::String(value.to_owned()));
    Ok((ModelId::new(model.trim()), value))
}

/// Backend stand-in that prints every call.
struct PrintingBackend;

impl PrintingBackend {
    fn print(call: &Value) {
        println!("{} {call}", style("→").cyan());
    }
}

impl Backend for PrintingBackend {
    fn dispatch_callback(&self, callback: CallbackId, payload: Value) -> Result<(), BackendError> {
        Self::print(&json!({"call": "dispatchCallback", "callback": callback, "payload": payload}));
        Ok(())
    }

    fn write_model_value(&self, model: &ModelId, value: Value) -> Result<(), BackendError> {
        Self::print(&json!({"call": "writeModelValue", "model": model, "value": value}));
        Ok(())
    }

    fn evaluate_computed(
        &self,
        computed: &ComputedId,
        args: Vec<Value>,
    ) -> LocalBoxFuture<'static, Result<Value, BackendError>> {
        Self::print(&json!({"call": "evaluateComputed", "computed": computed, "args": args}));
        futures::future::pending().boxed_local()
    }
}

/// Surface that prints mounted templates.
struct PrintingSurface {
    id_attribute: String,
}

impl Surface for PrintingSurface {
    fn mount(&mut self, target: MountTarget, markup: Markup) {
        println!("{} {target:?}", style("mount").green().bold());
        println!("{}", markup.template(&self.id_attribute));
    }

    fn unmount(&mut self, target: MountTarget) {
        println!("{} {target:?}", style("unmount").yellow().bold());
    }
}

/// Filter for a `-v` count, or `None` to keep the configured one.
fn verbosity_filter(verbose: u8) -> Option<&'static str> {
    match verbose {
        0 => None,
        1 => Some("debug"),
        _ => Some("trace"),
    }
}

pub fn run(args: ReplayArgs, verbose: u8) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::from_env(),
    };
    if args.eager {
        config.lazy_children = false;
    }
    if let Some(filter) = verbosity_filter(verbose) {
        filter.clone_into(&mut config.log_filter);
    }
    logging::install_from(&config);
    debug!(?config, "replay configuration");

    let log = fs::read_to_string(&args.file)
        .wrap_err_with(|| format!("failed to read {}", args.file.display()))?;

    let surface = PrintingSurface {
        id_attribute: config.id_attribute.clone(),
    };
    let session = Session::with_config(Rc::new(PrintingBackend), config);
    let mut driver = RenderDriver::new(surface);

    let mut failures = 0_usize;
    for (index, line) in log.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Err(err) = session.handle_json(line) {
            warn!(line = index + 1, "{err}");
            failures += 1;
        }
        driver.sync(&session);
        session.run_until_stalled();
        session.flush();
    }

    for (model, value) in args.inputs {
        if let Err(err) = session.write(&model, &[], value) {
            warn!(%model, "{err}");
            failures += 1;
        }
        driver.sync(&session);
    }
    session.flush();

    if failures > 0 {
        return Err(eyre!("{failures} message(s) could not be applied"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use aqueduct::ModelId;
    use serde_json::json;

    use super::{parse_input, verbosity_filter};

    #[test]
    fn inputs_parse_json_or_fall_back_to_text() {
        assert_eq!(parse_input("m1=42").unwrap(), (ModelId::new("m1"), json!(42)));
        assert_eq!(parse_input("name=bye").unwrap(), (ModelId::new("name"), json!("bye")));
        assert_eq!(
            parse_input("form={\"a\": [1]}").unwrap(),
            (ModelId::new("form"), json!({"a": [1]}))
        );
        assert!(parse_input("missing").is_err());
    }

    #[test]
    fn verbosity_overrides_the_configured_filter() {
        assert_eq!(verbosity_filter(0), None);
        assert_eq!(verbosity_filter(1), Some("debug"));
        assert_eq!(verbosity_filter(3), Some("trace"));
    }
}
