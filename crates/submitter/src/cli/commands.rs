//! Handlers behind each subcommand.

use std::convert::Infallible;
use std::fmt::Write as _;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use clap::CommandFactory;
use serde::Serialize;

use super::progress::tracker_with_bar;
use super::{Cli, Command, Selection, SubmitArgs};
use crate::app::manifest::{
    ItemErrorPolicy, PASSWORD_PLACEHOLDER, SubmissionManifest, USER_PLACEHOLDER,
};
use crate::app::packager::PackagerRegistry;
use crate::app::protocol::{self, ProtocolRegistry};
use crate::app::scan::{ItemScanner, ScannerConfig};
use crate::app::target::{AssignmentTarget, TargetCatalog};
use crate::app::traversal::{NoopTask, visit_items};
use crate::domain::errors::ItemFailure;
use crate::domain::model::SubmittableItem;
use crate::infra::config::Config;

pub(super) fn dispatch(cli: Cli) -> Result<()> {
    let mut stdout = io::stdout().lock();
    match cli.command {
        Command::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "submitter", &mut stdout);
            Ok(())
        }
        Command::List { all } => {
            let session = Session::load(cli.targets)?;
            list(&session.catalog, all, &mut stdout)
        }
        Command::Preview { selection, json } => {
            let session = Session::load(cli.targets)?;
            let target = session.catalog.find(&selection.assignment)?;
            let items = session.scan(&selection)?;
            let preview = Preview::build(target, &items);
            if json {
                serde_json::to_writer_pretty(&mut stdout, &preview)?;
                writeln!(stdout)?;
            } else {
                stdout.write_all(render_preview(&preview).as_bytes())?;
            }
            Ok(())
        }
        Command::Submit(args) => {
            let session = Session::load(cli.targets)?;
            submit(&session, args, !cli.quiet, &mut stdout)
        }
    }
}

/// Config plus the catalog it points at.
struct Session {
    config: Config,
    catalog: TargetCatalog,
}

impl Session {
    fn load(targets: Option<PathBuf>) -> Result<Self> {
        let config = Config::load()?;
        let path = targets
            .or_else(|| config.defaults.targets.clone())
            .ok_or_else(|| {
                anyhow!("no target catalog: pass --targets or set defaults.targets in config")
            })?;
        let catalog = TargetCatalog::from_file(&path)
            .with_context(|| format!("failed to load target catalog {}", path.display()))?;
        Ok(Self { config, catalog })
    }

    fn scan(&self, selection: &Selection) -> Result<Vec<SubmittableItem>> {
        let mut scanner = ScannerConfig::from_config(&self.config);
        if selection.hidden {
            scanner = scanner.with_show_hidden(true);
        }
        if selection.no_ignore {
            scanner = scanner.with_ignore_files(false);
        }
        ItemScanner::new(scanner).scan(&selection.paths)
    }
}

fn list(catalog: &TargetCatalog, all: bool, out: &mut dyn Write) -> Result<()> {
    for entry in catalog.entries() {
        if entry.hidden && !all {
            continue;
        }
        let marker = if entry.hidden { " (hidden)" } else { "" };
        writeln!(
            out,
            "{}{marker}\t{}",
            entry.target.qualified_name(),
            entry.target.packager()
        )?;
    }
    Ok(())
}

/// What a submission of the given items would contain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Preview {
    pub assignment: String,
    pub packager: String,
    /// Transport template; credentials are never filled in here.
    pub destination: String,
    pub included: Vec<String>,
    pub excluded: Vec<String>,
    pub missing_required: Vec<String>,
}

impl Preview {
    pub fn build(target: &AssignmentTarget, items: &[SubmittableItem]) -> Self {
        let mut preview = Self {
            assignment: target.qualified_name(),
            packager: target.packager().to_owned(),
            destination: target.transport().to_owned(),
            missing_required: target.missing_required_files(items),
            ..Self::default()
        };

        // NoopTask never cancels and the callback cannot fail.
        let _ = visit_items(items, &mut NoopTask, |item| {
            let path = item.filename().to_owned();
            if target.is_file_excluded(&path) {
                preview.excluded.push(path);
            } else {
                preview.included.push(path);
            }
            Ok::<(), Infallible>(())
        });
        preview
    }
}

pub fn render_preview(preview: &Preview) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Assignment:  {}", preview.assignment);
    let _ = writeln!(out, "Packager:    {}", preview.packager);
    let _ = writeln!(out, "Destination: {}", preview.destination);
    section(&mut out, "Included", '+', &preview.included);
    section(&mut out, "Excluded", '-', &preview.excluded);
    section(&mut out, "Missing required", '!', &preview.missing_required);
    out
}

fn section(out: &mut String, title: &str, bullet: char, paths: &[String]) {
    let _ = writeln!(out, "{title} ({}):", paths.len());
    if paths.is_empty() {
        let _ = writeln!(out, "  (none)");
    }
    for path in paths {
        let _ = writeln!(out, "  {bullet} {path}");
    }
}

fn submit(
    session: &Session,
    args: SubmitArgs,
    show_progress: bool,
    out: &mut dyn Write,
) -> Result<()> {
    let target = session.catalog.find(&args.selection.assignment)?.clone();
    let items = session.scan(&args.selection)?;

    let mut options = session.config.packaging.options();
    if let Some(ms) = args.item_delay_ms {
        options.item_delay = Duration::from_millis(ms);
    }
    if args.abort_on_item_error {
        options.on_item_error = ItemErrorPolicy::Abort;
    }

    let username = match args.user.or_else(|| session.config.defaults.username.clone()) {
        Some(user) => Some(user),
        None if mentions(&target, USER_PLACEHOLDER) => Some(prompt_username()?),
        None => None,
    };
    let password = if args.password_stdin {
        Some(read_password_line(io::stdin().lock())?)
    } else if mentions(&target, PASSWORD_PLACEHOLDER) {
        Some(prompt_password(username.as_deref())?)
    } else {
        None
    };

    let packagers = Arc::new(PackagerRegistry::with_defaults());
    let mut manifest = SubmissionManifest::new(target, items, packagers).with_options(options);
    manifest.set_username(username);
    manifest.set_password(password);

    let (mut tracker, bar) = tracker_with_bar(show_progress);

    if args.dry_run {
        manifest.check_required_files()?;
        let destination = manifest.resolved_transport_without_password()?;
        let mut counter = ByteCounter::default();
        let outcome = manifest.package_contents_into_stream(&mut counter, &mut tracker);
        bar.finish_and_clear();
        let report = outcome?;
        writeln!(
            out,
            "Dry run: {} file(s), {} bytes would be sent to {destination}",
            report.included.len(),
            counter.0
        )?;
        for path in &report.excluded {
            writeln!(out, "  excluded {path}")?;
        }
        report_failures(&report.failures);
        return Ok(());
    }

    let outcome = protocol::submit(&manifest, &ProtocolRegistry::with_defaults(), &mut tracker);
    bar.finish_and_clear();
    let response = outcome?;

    writeln!(
        out,
        "Submitted {} file(s) to {}",
        response.report.included.len(),
        response.destination
    )?;
    report_failures(&response.report.failures);
    if let Some(body) = response.body.as_deref().map(str::trim).filter(|b| !b.is_empty()) {
        writeln!(out, "{body}")?;
    }
    Ok(())
}

fn report_failures(failures: &[ItemFailure]) {
    for failure in failures {
        eprintln!("warning: {} was not packaged: {}", failure.path, failure.reason);
    }
}

fn mentions(target: &AssignmentTarget, placeholder: &str) -> bool {
    target.transport().contains(placeholder)
        || target
            .packager_params()
            .values()
            .any(|value| value.contains(placeholder))
}

fn prompt_username() -> Result<String> {
    if !io::stdin().is_terminal() {
        bail!("this assignment needs a username: pass --user or set SUBMITTER_USER");
    }
    Ok(dialoguer::Input::<String>::new()
        .with_prompt("Username")
        .interact_text()?)
}

fn prompt_password(username: Option<&str>) -> Result<String> {
    if !io::stdin().is_terminal() {
        bail!("this assignment needs a password: pass --password-stdin");
    }
    let prompt = match username {
        Some(user) => format!("Password for {user}"),
        None => "Password".to_owned(),
    };
    Ok(dialoguer::Password::new().with_prompt(prompt).interact()?)
}

fn read_password_line(mut input: impl BufRead) -> Result<String> {
    let mut line = String::new();
    input
        .read_line(&mut line)
        .context("failed to read password from stdin")?;
    let password = line.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        bail!("empty password on stdin");
    }
    Ok(password.to_owned())
}

#[derive(Debug, Default)]
struct ByteCounter(u64);

impl Write for ByteCounter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0 += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::rules::RuleLevel;

    fn target() -> AssignmentTarget {
        let level = RuleLevel::from_patterns(
            &["*.java".to_string()],
            &["*.class".to_string()],
            &["src/Main.java".to_string(), "README.md".to_string()],
        )
        .unwrap();
        AssignmentTarget::new("Lab 1", "https://grader.example.edu/${user}", "zip")
            .with_groups(vec!["CS 1114".into()])
            .with_level(level)
    }

    fn items() -> Vec<SubmittableItem> {
        vec![
            SubmittableItem::folder("bin")
                .with_child(SubmittableItem::in_memory("bin/Main.class", "")),
            SubmittableItem::folder("src")
                .with_child(SubmittableItem::in_memory("src/Main.java", "")),
        ]
    }

    #[test]
    fn preview_splits_items_by_rules() {
        let preview = Preview::build(&target(), &items());
        assert_eq!(preview.assignment, "CS 1114/Lab 1");
        assert_eq!(preview.included, vec!["src/Main.java"]);
        assert_eq!(preview.excluded, vec!["bin/Main.class"]);
        assert_eq!(preview.missing_required, vec!["README.md"]);
    }

    #[test]
    fn preview_renders_as_text() {
        let rendered = render_preview(&Preview::build(&target(), &items()));
        insta::assert_snapshot!(rendered, @r"
        Assignment:  CS 1114/Lab 1
        Packager:    zip
        Destination: https://grader.example.edu/${user}
        Included (1):
          + src/Main.java
        Excluded (1):
          - bin/Main.class
        Missing required (1):
          ! README.md
        ");
    }

    #[test]
    fn placeholders_are_detected_in_transport_and_params() {
        let target = target();
        assert!(mentions(&target, USER_PLACEHOLDER));
        assert!(!mentions(&target, PASSWORD_PLACEHOLDER));
        let with_param = target.with_param("comment", "pw=${pw}");
        assert!(mentions(&with_param, PASSWORD_PLACEHOLDER));
    }

    #[test]
    fn password_line_is_trimmed() {
        assert_eq!(read_password_line(&b"hunter2\r\n"[..]).unwrap(), "hunter2");
        assert!(read_password_line(&b"\n"[..]).is_err());
    }

    #[test]
    fn list_hides_hidden_assignments_unless_asked() {
        let catalog = TargetCatalog::from_toml(
            r#"
transport = "file:///tmp/out.zip"
packager = "zip"

[[assignment]]
name = "Lab 1"

[[assignment]]
name = "Secret"
hidden = true
"#,
        )
        .unwrap();

        let mut visible = Vec::new();
        list(&catalog, false, &mut visible).unwrap();
        assert_eq!(String::from_utf8(visible).unwrap(), "Lab 1\tzip\n");

        let mut all = Vec::new();
        list(&catalog, true, &mut all).unwrap();
        assert_eq!(
            String::from_utf8(all).unwrap(),
            "Lab 1\tzip\nSecret (hidden)\tzip\n"
        );
    }
}
