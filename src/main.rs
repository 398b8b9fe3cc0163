//! subterm - a minimal terminal session host
//!
//! subterm runs a single shell or command session on the controlling
//! terminal and guards against closing it while a foreground process is
//! still running. Closing with work in flight raises a confirmation
//! prompt instead of killing the process outright.
//!
//! # Quick Start
//!
//! ```text
//! subterm                # run $SHELL
//! subterm -c tango       # pick a color scheme
//! subterm -e vim notes   # run a command instead of the shell
//! ```
//!
//! # Shortcuts
//!
//! | Key | Action |
//! |-----|--------|
//! | Ctrl+Shift+W | Request close |
//! | Ctrl+Shift+C | Copy screen text |
//! | Ctrl+Shift+V | Paste clipboard |
//! | Ctrl+Shift+Y | Paste primary selection |
//! | Ctrl+Shift++ | Grow font |
//! | Ctrl+- | Shrink font |
//! | Ctrl+= | Reset font |
//! | Shift+PageUp/PageDown | Scroll history |

mod config;
mod core;
mod ui;

use std::env;
use std::io::Write;
use std::process;
use std::time::Duration;

use arboard::Clipboard;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers, MouseEventKind};
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use vt100::MouseProtocolMode;

use crate::config::{resize_font_description, ColorScheme, Config};
use crate::core::command;
use crate::core::env::{export_session_term, EnvironmentSnapshot, SESSION_TERM};
use crate::core::foreground::PtyForeground;
use crate::core::lifecycle::{CloseState, Effect, Lifecycle, LifecycleEvent};
use crate::core::session::{Session, SessionNotice};
use crate::ui::{InputModes, KeyMapper, TermWidget};

/// Version string from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_version() {
    println!("subterm {}", VERSION);
}

fn print_usage() {
    println!("Usage: subterm [-r] [-k] [-w] [-c scheme] [-f font] [-t percent] [-n lines] [[-e] command [args ...]]");
    println!();
    println!("Args:");
    println!(" -c <string>: color scheme: {}", ColorScheme::list().join(", "));
    println!(" -r: reverse the color scheme");
    println!(" -k: disable default shortcuts");
    println!(" -w: do not propagate titles to the host terminal");
    println!(" -f <string>: font description, e.g. \"Monospace 11\"");
    println!(" -t <number>: background transparency percent (0-100)");
    println!(" -n <number>: scrollback lines, negative for unlimited");
    println!(" -e: run the remaining arguments instead of the shell");
    println!(" -v: show version");
}

/// Command line options layered over the config file.
#[derive(Debug, Default, PartialEq)]
struct CliOptions {
    color_scheme: Option<String>,
    reverse: bool,
    no_shortcuts: bool,
    no_decorations: bool,
    font: Option<String>,
    transparency: Option<u8>,
    scrollback: Option<i64>,
    command: Option<Vec<String>>,
}

#[derive(Debug, PartialEq)]
enum CliAction {
    Run(CliOptions),
    Version,
    Usage,
}

/// Parse arguments (without the program name). `-e` and the first bare
/// argument both consume everything that follows as the command line to
/// run; any unknown flag falls back to the usage text.
fn parse_args(args: &[String]) -> CliAction {
    let mut opts = CliOptions::default();
    let mut i = 0;

    while i < args.len() {
        match args[i].as_str() {
            "-c" => {
                i += 1;
                match args.get(i) {
                    Some(v) => opts.color_scheme = Some(v.clone()),
                    None => return CliAction::Usage,
                }
            }
            "-r" => opts.reverse = true,
            "-k" => opts.no_shortcuts = true,
            "-w" => opts.no_decorations = true,
            "-f" => {
                i += 1;
                match args.get(i) {
                    Some(v) => opts.font = Some(v.clone()),
                    None => return CliAction::Usage,
                }
            }
            "-n" => {
                i += 1;
                match args.get(i) {
                    Some(v) => opts.scrollback = Some(v.parse().unwrap_or(0)),
                    None => return CliAction::Usage,
                }
            }
            "-t" => {
                i += 1;
                match args.get(i) {
                    Some(v) => {
                        let percent = v.parse::<i64>().unwrap_or(0).clamp(0, 100);
                        opts.transparency = Some(percent as u8);
                    }
                    None => return CliAction::Usage,
                }
            }
            "-e" => {
                let rest = &args[i + 1..];
                if !rest.is_empty() {
                    opts.command = Some(rest.to_vec());
                }
                return CliAction::Run(opts);
            }
            "-v" => return CliAction::Version,
            arg if arg.starts_with('-') => return CliAction::Usage,
            _ => {
                opts.command = Some(args[i..].to_vec());
                return CliAction::Run(opts);
            }
        }
        i += 1;
    }

    CliAction::Run(opts)
}

/// Layer command-line flags over the loaded config. Absent flags leave
/// the file values alone.
fn apply_cli(config: &mut Config, opts: &CliOptions) {
    if let Some(scheme) = &opts.color_scheme {
        config.color_scheme = scheme.clone();
    }
    if opts.reverse {
        config.reverse = true;
    }
    if opts.no_shortcuts {
        config.shortcuts = false;
    }
    if opts.no_decorations {
        config.decorated = false;
    }
    if let Some(font) = &opts.font {
        config.font = font.clone();
    }
    if let Some(percent) = opts.transparency {
        config.transparency = percent;
    }
    if let Some(lines) = opts.scrollback {
        config.scrollback = lines;
    }
}

fn setup_logging() {
    let log_path = command::home_dir()
        .map(|h| h.join(".subterm").join("subterm.log"))
        .unwrap_or_else(|| std::path::PathBuf::from("subterm.log"));

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok();

    if let Some(file) = log_file {
        let filter =
            EnvFilter::try_from_env("SUBTERM_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let opts = match parse_args(&args) {
        CliAction::Run(opts) => opts,
        CliAction::Version => {
            print_version();
            return Ok(());
        }
        CliAction::Usage => {
            print_usage();
            return Ok(());
        }
    };

    setup_logging();
    info!("subterm {} starting", VERSION);

    let mut config = Config::load();
    // sway draws no server-side decorations; skip title propagation there
    if env::var_os("SWAYSOCK").is_some() {
        config.decorated = false;
    }
    apply_cli(&mut config, &opts);

    let status = run(config, opts.command)?;
    info!("exiting with status {}", status);
    process::exit(status);
}

/// Spawn environment for the child: the sanitized snapshot plus the
/// forced session TERM.
fn child_environment(snapshot: &EnvironmentSnapshot) -> Vec<(String, String)> {
    let mut env = snapshot.to_pairs();
    env.push(("TERM".to_string(), SESSION_TERM.to_string()));
    env
}

fn run(config: Config, command_line: Option<Vec<String>>) -> anyhow::Result<i32> {
    let snapshot = EnvironmentSnapshot::from_process();
    let plan = command::resolve(
        command_line.as_deref(),
        snapshot.shell.as_deref(),
        snapshot.pwd.as_deref(),
    );
    info!("session command: {:?} in {}", plan.argv, plan.cwd.display());

    let child_env = child_environment(&snapshot);
    export_session_term();

    let (cols, rows) = TermWidget::host_size()?;
    info!("host terminal size: {}x{}", cols, rows);

    let mut widget = TermWidget::new(&config, rows, cols);
    widget.realize()?;
    if config.decorated {
        set_host_title("subterm");
    }

    let mut session = Session::spawn(plan, child_env, rows, cols);
    let mut lifecycle = Lifecycle::new();

    let result = run_loop(&mut widget, &mut session, &mut lifecycle, &config);

    // Give the host terminal back before reporting the exit status.
    widget.unrealize();
    result
}

/// Main event loop
fn run_loop(
    widget: &mut TermWidget,
    session: &mut Session,
    lifecycle: &mut Lifecycle,
    config: &Config,
) -> anyhow::Result<i32> {
    let poll_timeout = Duration::from_millis(10);
    let mut clipboard: Option<Clipboard> = None;
    let mut exit_code = 0;
    let mut stop = false;

    while !stop {
        // Session worker notices
        while let Some(notice) = session.poll() {
            match notice {
                SessionNotice::Spawned(Ok((pid, io))) => {
                    widget.attach(io);
                    let inspector = PtyForeground::new(widget.pty_fd());
                    let effects = lifecycle.dispatch(LifecycleEvent::SpawnCompleted(pid), &inspector);
                    apply_effects(effects, widget, config, &mut exit_code, &mut stop)?;
                }
                SessionNotice::Spawned(Err(e)) => {
                    error!("session start failed: {}", e);
                    let inspector = PtyForeground::new(widget.pty_fd());
                    let effects = lifecycle.dispatch(LifecycleEvent::SpawnCompleted(-1), &inspector);
                    apply_effects(effects, widget, config, &mut exit_code, &mut stop)?;
                }
                SessionNotice::Exited(status) => {
                    let inspector = PtyForeground::new(widget.pty_fd());
                    let effects = lifecycle.dispatch(LifecycleEvent::ChildExited(status), &inspector);
                    apply_effects(effects, widget, config, &mut exit_code, &mut stop)?;
                }
            }
        }
        if stop {
            break;
        }

        // Child output
        if widget.pump_output() {
            widget.render()?;
        }
        widget.ring_pending_bell();
        if let Some(title) = widget.poll_title() {
            let inspector = PtyForeground::new(widget.pty_fd());
            let effects = lifecycle.dispatch(LifecycleEvent::TitleChanged(title), &inspector);
            apply_effects(effects, widget, config, &mut exit_code, &mut stop)?;
        }

        // Input events
        if !event::poll(poll_timeout)? {
            continue;
        }
        match event::read()? {
            Event::Key(key) => {
                if key.kind != KeyEventKind::Press {
                    continue;
                }

                // The prompt is modal: Enter accepts, Esc cancels,
                // everything else is swallowed.
                if lifecycle.close_state == CloseState::PendingConfirmation {
                    let dialog_event = match key.code {
                        KeyCode::Enter => Some(LifecycleEvent::DialogAccepted),
                        KeyCode::Esc => Some(LifecycleEvent::DialogDismissed),
                        _ => None,
                    };
                    if let Some(event) = dialog_event {
                        let inspector = PtyForeground::new(widget.pty_fd());
                        let effects = lifecycle.dispatch(event, &inspector);
                        apply_effects(effects, widget, config, &mut exit_code, &mut stop)?;
                    }
                    continue;
                }

                let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
                let shift = key.modifiers.contains(KeyModifiers::SHIFT);

                // Close request, active regardless of -k
                if ctrl && shift && matches!(key.code, KeyCode::Char('w') | KeyCode::Char('W')) {
                    let inspector = PtyForeground::new(widget.pty_fd());
                    let effects = lifecycle.dispatch(LifecycleEvent::CloseRequested, &inspector);
                    apply_effects(effects, widget, config, &mut exit_code, &mut stop)?;
                    continue;
                }

                // Scrollback view
                if shift && key.code == KeyCode::PageUp {
                    let (rows, _) = widget.size();
                    widget.scroll_view((rows / 2) as isize);
                    widget.render()?;
                    continue;
                }
                if shift && key.code == KeyCode::PageDown {
                    let (rows, _) = widget.size();
                    widget.scroll_view(-((rows / 2) as isize));
                    widget.render()?;
                    continue;
                }

                if config.shortcuts && ctrl {
                    if shift && matches!(key.code, KeyCode::Char('c') | KeyCode::Char('C')) {
                        if let Some(cb) = clipboard_handle(&mut clipboard) {
                            if let Err(e) = cb.set_text(widget.visible_contents()) {
                                error!("copy failed: {}", e);
                            }
                        }
                        continue;
                    }
                    if shift && matches!(key.code, KeyCode::Char('v') | KeyCode::Char('V')) {
                        let text = clipboard_handle(&mut clipboard).and_then(clipboard_text);
                        if let Some(text) = text {
                            paste_to_child(widget, &text);
                        }
                        continue;
                    }
                    if shift && matches!(key.code, KeyCode::Char('y') | KeyCode::Char('Y')) {
                        let text = clipboard_handle(&mut clipboard).and_then(primary_text);
                        if let Some(text) = text {
                            paste_to_child(widget, &text);
                        }
                        continue;
                    }
                    if key.code == KeyCode::Char('+') {
                        let next = resize_font_description(widget.font(), 1);
                        if let Err(e) = widget.set_font(&next) {
                            error!("font change failed: {}", e);
                        }
                        continue;
                    }
                    if key.code == KeyCode::Char('-') {
                        let next = resize_font_description(widget.font(), -1);
                        if let Err(e) = widget.set_font(&next) {
                            error!("font change failed: {}", e);
                        }
                        continue;
                    }
                    if key.code == KeyCode::Char('=') {
                        if let Err(e) = widget.set_font(&config.font) {
                            error!("font change failed: {}", e);
                        }
                        continue;
                    }
                }

                // Typing returns the view to live output
                widget.snap_to_live();
                let modes = InputModes::from_screen(widget.screen());
                if let Some(bytes) = KeyMapper::map(&key, &modes) {
                    if let Err(e) = widget.write_input(&bytes) {
                        error!("failed to write to pty: {}", e);
                    }
                }
            }

            Event::Paste(text) => {
                if lifecycle.close_state == CloseState::PendingConfirmation {
                    continue;
                }
                paste_to_child(widget, &text);
            }

            Event::Resize(cols, rows) => {
                debug!("host resize: {}x{}", cols, rows);
                widget.resize(rows, cols);
                widget.render()?;
            }

            Event::Mouse(mouse) => {
                if lifecycle.close_state == CloseState::PendingConfirmation {
                    continue;
                }

                // Shift bypasses passthrough so the host keeps wheel
                // scrolling even under mouse-aware programs
                let shift_held = mouse.modifiers.contains(KeyModifiers::SHIFT);
                let (mode, encoding) = {
                    let screen = widget.screen();
                    (screen.mouse_protocol_mode(), screen.mouse_protocol_encoding())
                };
                if !shift_held && mode != MouseProtocolMode::None {
                    if let Some(bytes) = KeyMapper::encode_mouse_event(&mouse, mode, encoding) {
                        if let Err(e) = widget.write_input(&bytes) {
                            error!("failed to write to pty: {}", e);
                        }
                    }
                    continue;
                }

                match mouse.kind {
                    MouseEventKind::ScrollUp => {
                        widget.scroll_view(3);
                        widget.render()?;
                    }
                    MouseEventKind::ScrollDown => {
                        widget.scroll_view(-3);
                        widget.render()?;
                    }
                    _ => {}
                }
            }

            _ => {}
        }
    }

    Ok(exit_code)
}

/// Carry out the state machine's orders in the order given.
fn apply_effects(
    effects: Vec<Effect>,
    widget: &mut TermWidget,
    config: &Config,
    exit_code: &mut i32,
    stop: &mut bool,
) -> anyhow::Result<()> {
    for effect in effects {
        match effect {
            Effect::ShowCloseDialog => {
                widget.show_close_prompt();
                widget.render()?;
            }
            Effect::CloseDialog => {
                widget.dismiss_close_prompt();
                widget.render()?;
            }
            Effect::SetTitle(title) => {
                if config.decorated {
                    set_host_title(&title);
                }
            }
            Effect::ReleaseSurface => widget.unrealize(),
            Effect::StopLoop => *stop = true,
            Effect::Exit(status) => *exit_code = status,
        }
    }
    Ok(())
}

fn set_host_title(title: &str) {
    print!("\x1b]0;{}\x07", title);
    let _ = std::io::stdout().flush();
}

fn paste_to_child(widget: &mut TermWidget, text: &str) {
    widget.snap_to_live();
    let modes = InputModes::from_screen(widget.screen());
    let bytes = KeyMapper::encode_paste(text, &modes);
    if let Err(e) = widget.write_input(&bytes) {
        error!("failed to paste: {}", e);
    }
}

/// Lazily opened clipboard; failure is logged once per attempt.
fn clipboard_handle(slot: &mut Option<Clipboard>) -> Option<&mut Clipboard> {
    if slot.is_none() {
        match Clipboard::new() {
            Ok(cb) => *slot = Some(cb),
            Err(e) => {
                error!("clipboard unavailable: {}", e);
                return None;
            }
        }
    }
    slot.as_mut()
}

fn clipboard_text(cb: &mut Clipboard) -> Option<String> {
    match cb.get_text() {
        Ok(text) => Some(text),
        Err(e) => {
            error!("paste failed: {}", e);
            None
        }
    }
}

#[cfg(target_os = "linux")]
fn primary_text(cb: &mut Clipboard) -> Option<String> {
    use arboard::{GetExtLinux, LinuxClipboardKind};
    match cb.get().clipboard(LinuxClipboardKind::Primary).text() {
        Ok(text) => Some(text),
        Err(e) => {
            error!("primary selection unavailable: {}", e);
            None
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn primary_text(cb: &mut Clipboard) -> Option<String> {
    clipboard_text(cb)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn run_opts(action: CliAction) -> CliOptions {
        match action {
            CliAction::Run(opts) => opts,
            other => panic!("expected Run, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_no_args() {
        let opts = run_opts(parse_args(&[]));
        assert_eq!(opts, CliOptions::default());
    }

    #[test]
    fn test_parse_flags() {
        let opts = run_opts(parse_args(&args(&["-r", "-k", "-w"])));
        assert!(opts.reverse);
        assert!(opts.no_shortcuts);
        assert!(opts.no_decorations);
        assert_eq!(opts.command, None);
    }

    #[test]
    fn test_parse_value_flags() {
        let opts = run_opts(parse_args(&args(&[
            "-c", "tango", "-f", "Monospace 13", "-n", "5000", "-t", "30",
        ])));
        assert_eq!(opts.color_scheme.as_deref(), Some("tango"));
        assert_eq!(opts.font.as_deref(), Some("Monospace 13"));
        assert_eq!(opts.scrollback, Some(5000));
        assert_eq!(opts.transparency, Some(30));
    }

    #[test]
    fn test_parse_missing_value_is_usage() {
        assert_eq!(parse_args(&args(&["-c"])), CliAction::Usage);
        assert_eq!(parse_args(&args(&["-f"])), CliAction::Usage);
    }

    #[test]
    fn test_parse_unknown_flag_is_usage() {
        assert_eq!(parse_args(&args(&["-x"])), CliAction::Usage);
        assert_eq!(parse_args(&args(&["-h"])), CliAction::Usage);
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_args(&args(&["-v"])), CliAction::Version);
    }

    #[test]
    fn test_command_takes_everything_after_e() {
        let opts = run_opts(parse_args(&args(&["-r", "-e", "vim", "-R", "notes.txt"])));
        assert!(opts.reverse);
        assert_eq!(opts.command, Some(args(&["vim", "-R", "notes.txt"])));
    }

    #[test]
    fn test_bare_e_runs_default_shell() {
        let opts = run_opts(parse_args(&args(&["-e"])));
        assert_eq!(opts.command, None);
    }

    #[test]
    fn test_bare_arguments_become_the_command() {
        let opts = run_opts(parse_args(&args(&["htop", "-d", "10"])));
        assert_eq!(opts.command, Some(args(&["htop", "-d", "10"])));
    }

    #[test]
    fn test_flags_after_command_are_not_parsed() {
        let opts = run_opts(parse_args(&args(&["ls", "-r"])));
        assert!(!opts.reverse);
        assert_eq!(opts.command, Some(args(&["ls", "-r"])));
    }

    #[test]
    fn test_garbage_numbers_fall_back_to_zero() {
        let opts = run_opts(parse_args(&args(&["-n", "lots", "-t", "max"])));
        assert_eq!(opts.scrollback, Some(0));
        assert_eq!(opts.transparency, Some(0));
    }

    #[test]
    fn test_transparency_clamped_to_percent() {
        let opts = run_opts(parse_args(&args(&["-t", "250"])));
        assert_eq!(opts.transparency, Some(100));
    }

    #[test]
    fn test_cli_overrides_config_file() {
        let mut config = Config {
            color_scheme: "wombat".to_string(),
            scrollback: 200,
            ..Config::default()
        };
        let opts = run_opts(parse_args(&args(&["-c", "tango", "-k"])));
        apply_cli(&mut config, &opts);
        assert_eq!(config.color_scheme, "tango");
        assert!(!config.shortcuts);
        // untouched by flags
        assert_eq!(config.scrollback, 200);
    }

    #[test]
    fn test_child_environment_forces_session_term() {
        let snapshot =
            EnvironmentSnapshot::build(["TERM=dumb", "PATH=/usr/bin", "SHELL=/bin/zsh"]);
        let env = child_environment(&snapshot);
        assert!(env.contains(&("TERM".to_string(), "xterm-256color".to_string())));
        assert_eq!(
            env.iter().filter(|(key, _)| key.as_str() == "TERM").count(),
            1
        );
    }
}
