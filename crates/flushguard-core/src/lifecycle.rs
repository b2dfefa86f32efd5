//! Host lifecycle events and the per-event flush policy
//!
//! The host delivers one transition at a time on its main thread. Each event
//! maps to a `FlushAction` through a `FlushPolicy` table; the dispatcher only
//! executes what the table says.

use std::fmt;

/// A host-issued lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// Process or scene moved to the background (home button, app switcher)
    EnteringBackground,
    /// Lost focus but still visible (incoming call, control center)
    ResigningActive,
    /// Coming back from the background
    EnteringForeground,
    /// Regained focus
    BecameActive,
    /// Scene is being torn down (user swiped the app away)
    SceneDisconnecting,
    /// Process is about to exit. Only delivered by the legacy lifecycle.
    WillTerminate,
}

impl LifecycleEvent {
    /// Every event kind, in declaration order.
    pub const ALL: [LifecycleEvent; 6] = [
        LifecycleEvent::EnteringBackground,
        LifecycleEvent::ResigningActive,
        LifecycleEvent::EnteringForeground,
        LifecycleEvent::BecameActive,
        LifecycleEvent::SceneDisconnecting,
        LifecycleEvent::WillTerminate,
    ];

    /// Stable name used in log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleEvent::EnteringBackground => "entering_background",
            LifecycleEvent::ResigningActive => "resigning_active",
            LifecycleEvent::EnteringForeground => "entering_foreground",
            LifecycleEvent::BecameActive => "became_active",
            LifecycleEvent::SceneDisconnecting => "scene_disconnecting",
            LifecycleEvent::WillTerminate => "will_terminate",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which lifecycle API the host process is driven by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostLifecycle {
    /// Application-delegate callbacks only (no scene support)
    Legacy,
    /// Scene-based lifecycle
    Scene,
}

/// What the dispatcher does in response to an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushAction {
    /// Log the transition and return
    None,
    /// Run the file sync engine directly, skipping the managed runtime
    DirectSync,
    /// Ask the managed runtime first, fall back to the file sync engine
    Tiered,
}

/// Per-event action table.
///
/// Background is split by host lifecycle because the legacy and scene paths
/// make different promises about the managed runtime at that point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushPolicy {
    pub legacy_background: FlushAction,
    pub scene_background: FlushAction,
    pub resigning_active: FlushAction,
    pub entering_foreground: FlushAction,
    pub became_active: FlushAction,
    pub scene_disconnecting: FlushAction,
    pub will_terminate: FlushAction,
}

impl FlushPolicy {
    /// Trust the store to sync on every write; only the legacy hooks flush.
    pub fn trusting_store() -> Self {
        Self {
            legacy_background: FlushAction::DirectSync,
            scene_background: FlushAction::None,
            resigning_active: FlushAction::None,
            entering_foreground: FlushAction::None,
            became_active: FlushAction::None,
            scene_disconnecting: FlushAction::None,
            will_terminate: FlushAction::DirectSync,
        }
    }

    /// Per-write durability is unconfirmed: scene teardown and scene
    /// background run the tiered flush as well.
    pub fn conservative() -> Self {
        Self {
            scene_background: FlushAction::Tiered,
            scene_disconnecting: FlushAction::Tiered,
            ..Self::trusting_store()
        }
    }

    /// Look up the action for `event` under the given host lifecycle.
    pub fn action_for(&self, event: LifecycleEvent, host: HostLifecycle) -> FlushAction {
        match event {
            LifecycleEvent::EnteringBackground => match host {
                HostLifecycle::Legacy => self.legacy_background,
                HostLifecycle::Scene => self.scene_background,
            },
            LifecycleEvent::ResigningActive => self.resigning_active,
            LifecycleEvent::EnteringForeground => self.entering_foreground,
            LifecycleEvent::BecameActive => self.became_active,
            LifecycleEvent::SceneDisconnecting => self.scene_disconnecting,
            LifecycleEvent::WillTerminate => self.will_terminate,
        }
    }
}

impl Default for FlushPolicy {
    fn default() -> Self { Self::trusting_store() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_table() {
        let policy = FlushPolicy::default();
        use HostLifecycle::*;
        use LifecycleEvent::*;

        assert_eq!(policy.action_for(WillTerminate, Legacy), FlushAction::DirectSync);
        assert_eq!(policy.action_for(WillTerminate, Scene), FlushAction::DirectSync);
        assert_eq!(policy.action_for(EnteringBackground, Legacy), FlushAction::DirectSync);
        assert_eq!(policy.action_for(EnteringBackground, Scene), FlushAction::None);
        assert_eq!(policy.action_for(SceneDisconnecting, Scene), FlushAction::None);

        for event in [ResigningActive, BecameActive, EnteringForeground] {
            assert_eq!(policy.action_for(event, Legacy), FlushAction::None);
            assert_eq!(policy.action_for(event, Scene), FlushAction::None);
        }
    }

    #[test]
    fn test_conservative_only_changes_scene_paths() {
        let trusting = FlushPolicy::trusting_store();
        let conservative = FlushPolicy::conservative();

        assert_eq!(
            conservative.action_for(LifecycleEvent::SceneDisconnecting, HostLifecycle::Scene),
            FlushAction::Tiered
        );
        assert_eq!(
            conservative.action_for(LifecycleEvent::EnteringBackground, HostLifecycle::Scene),
            FlushAction::Tiered
        );
        assert_eq!(conservative.will_terminate, trusting.will_terminate);
        assert_eq!(conservative.legacy_background, trusting.legacy_background);
    }

    #[test]
    fn test_event_names_are_unique() {
        let mut names: Vec<&str> = LifecycleEvent::ALL.iter().map(|e| e.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), LifecycleEvent::ALL.len());
    }
}
