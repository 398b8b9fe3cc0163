//! Session lifecycle and close confirmation
//!
//! One state machine owns every close/exit decision. Events arrive from
//! the host loop (close requests, dialog answers) and from the session
//! (spawn completion, child exit); dispatching returns an ordered list of
//! effects for the loop to carry out, so every transition is testable
//! without a live terminal.

use tracing::{debug, info, warn};

use crate::core::foreground::{have_foreground_process, ForegroundInspect};

/// Close confirmation progress. At most one confirmation is pending;
/// `Closing` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseState {
    Idle,
    PendingConfirmation,
    Closing,
}

/// Events the dispatcher understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The user asked to close the terminal.
    CloseRequested,
    /// The confirmation dialog was answered with its close action.
    DialogAccepted,
    /// The confirmation dialog was cancelled or dismissed.
    DialogDismissed,
    /// Spawn completion carrying the child pid, or -1 on failure.
    SpawnCompleted(i32),
    /// The child terminated with this exit status.
    ChildExited(i32),
    /// The child retitled the terminal.
    TitleChanged(String),
}

/// Side effects for the event loop, in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    ShowCloseDialog,
    CloseDialog,
    SetTitle(String),
    ReleaseSurface,
    StopLoop,
    Exit(i32),
}

/// The single live session and its close state.
pub struct Lifecycle {
    pub close_state: CloseState,
    /// Child pid, -1 until spawn completes. Set exactly once.
    pub child_pid: i32,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            close_state: CloseState::Idle,
            child_pid: -1,
        }
    }

    /// Apply one event and return the effects to run, in order.
    pub fn dispatch(
        &mut self,
        event: LifecycleEvent,
        inspector: &dyn ForegroundInspect,
    ) -> Vec<Effect> {
        match event {
            LifecycleEvent::CloseRequested => self.on_close_requested(inspector),
            LifecycleEvent::DialogAccepted => self.on_dialog_answer(true),
            LifecycleEvent::DialogDismissed => self.on_dialog_answer(false),
            LifecycleEvent::SpawnCompleted(pid) => self.on_spawn_completed(pid),
            LifecycleEvent::ChildExited(status) => self.on_child_exited(status),
            LifecycleEvent::TitleChanged(title) => vec![Effect::SetTitle(title)],
        }
    }

    fn on_close_requested(&mut self, inspector: &dyn ForegroundInspect) -> Vec<Effect> {
        match self.close_state {
            CloseState::Idle => {
                if have_foreground_process(inspector, self.child_pid) {
                    info!("close request gated behind confirmation");
                    self.close_state = CloseState::PendingConfirmation;
                    vec![Effect::ShowCloseDialog]
                } else {
                    info!("close request honored, no foreground process");
                    self.close_state = CloseState::Closing;
                    vec![Effect::StopLoop]
                }
            }
            // A repeated request must not stack a second dialog.
            CloseState::PendingConfirmation => Vec::new(),
            CloseState::Closing => Vec::new(),
        }
    }

    fn on_dialog_answer(&mut self, accepted: bool) -> Vec<Effect> {
        if self.close_state != CloseState::PendingConfirmation {
            return Vec::new();
        }
        if accepted {
            info!("close confirmed");
            self.close_state = CloseState::Closing;
            vec![Effect::CloseDialog, Effect::StopLoop]
        } else {
            debug!("close cancelled");
            self.close_state = CloseState::Idle;
            vec![Effect::CloseDialog]
        }
    }

    fn on_spawn_completed(&mut self, pid: i32) -> Vec<Effect> {
        if pid == -1 {
            warn!("spawn failed, exiting with neutral status");
            self.close_state = CloseState::Closing;
            return vec![Effect::ReleaseSurface, Effect::StopLoop, Effect::Exit(0)];
        }
        if self.child_pid != -1 {
            // Completion is single-shot; a late duplicate cannot rebind.
            return Vec::new();
        }
        info!("session child running (pid {})", pid);
        self.child_pid = pid;
        Vec::new()
    }

    /// Child exit always wins, pending confirmation or not. The surface
    /// must come down before the loop stops and the process exits;
    /// releasing it any later can hang teardown when the rendering
    /// backend is bridged onto a different display protocol.
    fn on_child_exited(&mut self, status: i32) -> Vec<Effect> {
        info!("child exited with status {}", status);
        self.close_state = CloseState::Closing;
        vec![Effect::ReleaseSurface, Effect::StopLoop, Effect::Exit(status)]
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::foreground::ForegroundQuery;

    struct Stub(Option<ForegroundQuery>);

    impl ForegroundInspect for Stub {
        fn query(&self) -> Option<ForegroundQuery> {
            self.0.clone()
        }
    }

    fn idle() -> Stub {
        Stub(None)
    }

    fn busy() -> Stub {
        Stub(Some(ForegroundQuery {
            pid: 4242,
            name: "vim".to_string(),
        }))
    }

    fn pending_lifecycle() -> Lifecycle {
        let mut lc = Lifecycle::new();
        lc.dispatch(LifecycleEvent::SpawnCompleted(100), &idle());
        let effects = lc.dispatch(LifecycleEvent::CloseRequested, &busy());
        assert_eq!(effects, vec![Effect::ShowCloseDialog]);
        lc
    }

    #[test]
    fn test_close_without_foreground_goes_straight_to_closing() {
        let mut lc = Lifecycle::new();
        let effects = lc.dispatch(LifecycleEvent::CloseRequested, &idle());
        assert_eq!(effects, vec![Effect::StopLoop]);
        assert_eq!(lc.close_state, CloseState::Closing);
    }

    #[test]
    fn test_close_with_foreground_asks_first() {
        let lc = pending_lifecycle();
        assert_eq!(lc.close_state, CloseState::PendingConfirmation);
    }

    #[test]
    fn test_cancel_returns_to_idle() {
        let mut lc = pending_lifecycle();
        let effects = lc.dispatch(LifecycleEvent::DialogDismissed, &busy());
        assert_eq!(effects, vec![Effect::CloseDialog]);
        assert_eq!(lc.close_state, CloseState::Idle);
    }

    #[test]
    fn test_accept_closes() {
        let mut lc = pending_lifecycle();
        let effects = lc.dispatch(LifecycleEvent::DialogAccepted, &busy());
        assert_eq!(effects, vec![Effect::CloseDialog, Effect::StopLoop]);
        assert_eq!(lc.close_state, CloseState::Closing);
    }

    #[test]
    fn test_second_close_request_is_ignored_while_pending() {
        let mut lc = pending_lifecycle();
        let effects = lc.dispatch(LifecycleEvent::CloseRequested, &busy());
        assert!(effects.is_empty());
        assert_eq!(lc.close_state, CloseState::PendingConfirmation);
    }

    #[test]
    fn test_dialog_answer_ignored_when_idle() {
        let mut lc = Lifecycle::new();
        assert!(lc.dispatch(LifecycleEvent::DialogAccepted, &idle()).is_empty());
        assert!(lc.dispatch(LifecycleEvent::DialogDismissed, &idle()).is_empty());
        assert_eq!(lc.close_state, CloseState::Idle);
    }

    #[test]
    fn test_spawn_completion_binds_pid_once() {
        let mut lc = Lifecycle::new();
        assert!(lc.dispatch(LifecycleEvent::SpawnCompleted(100), &idle()).is_empty());
        assert_eq!(lc.child_pid, 100);
        assert!(lc.dispatch(LifecycleEvent::SpawnCompleted(200), &idle()).is_empty());
        assert_eq!(lc.child_pid, 100);
    }

    #[test]
    fn test_spawn_failure_exits_neutral() {
        let mut lc = Lifecycle::new();
        let effects = lc.dispatch(LifecycleEvent::SpawnCompleted(-1), &idle());
        assert_eq!(
            effects,
            vec![Effect::ReleaseSurface, Effect::StopLoop, Effect::Exit(0)]
        );
    }

    #[test]
    fn test_child_exit_reports_status_in_teardown_order() {
        let mut lc = Lifecycle::new();
        lc.dispatch(LifecycleEvent::SpawnCompleted(100), &idle());
        let effects = lc.dispatch(LifecycleEvent::ChildExited(3), &idle());
        assert_eq!(
            effects,
            vec![Effect::ReleaseSurface, Effect::StopLoop, Effect::Exit(3)]
        );
        assert_eq!(lc.close_state, CloseState::Closing);
    }

    #[test]
    fn test_child_exit_wins_over_pending_dialog() {
        let mut lc = pending_lifecycle();
        let effects = lc.dispatch(LifecycleEvent::ChildExited(0), &busy());
        assert_eq!(
            effects,
            vec![Effect::ReleaseSurface, Effect::StopLoop, Effect::Exit(0)]
        );
        assert_eq!(lc.close_state, CloseState::Closing);
    }

    #[test]
    fn test_title_change_passes_through() {
        let mut lc = Lifecycle::new();
        let effects = lc.dispatch(
            LifecycleEvent::TitleChanged("host:~".to_string()),
            &idle(),
        );
        assert_eq!(effects, vec![Effect::SetTitle("host:~".to_string())]);
    }
}
