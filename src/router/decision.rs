//! Priority derivation and route decision — spec §4.1.2/§4.1.3.
//!
//! Both are pure functions of `(task flags, complexity, RouterConfig,
//! ExecutorStatus)` — invariant I-R2.

use crate::error::RouterError;
use crate::types::{ExecutorStatus, Priority, Route, RouterConfig, RoutingMode};

/// `complexity >= 8 OR realtime -> URGENT; complexity >= 4 -> NORMAL; else BACKGROUND.`
pub fn derive_priority(complexity: u8, realtime: bool) -> Priority {
    if complexity >= 8 || realtime {
        Priority::Urgent
    } else if complexity >= 4 {
        Priority::Normal
    } else {
        Priority::Background
    }
}

/// Five-step ordered route decision — first match wins (spec §4.1.3).
///
/// Step 1 (privacy) never falls back to CLOUD: if no local executor exists
/// the caller must fail the task with [`RouterError::NoExecutorAvailable`],
/// not silently re-route — see spec.md §9 Open Question (i).
pub fn decide_route(
    privacy_flag: bool,
    realtime: bool,
    complexity: u8,
    config: &RouterConfig,
    status: &ExecutorStatus,
) -> Result<Route, RouterError> {
    if privacy_flag {
        return if status.local_model_loaded {
            Ok(Route::Local)
        } else {
            Err(RouterError::NoExecutorAvailable)
        };
    }

    if realtime && status.local_model_loaded {
        return Ok(Route::Local);
    }

    match config.mode {
        RoutingMode::Local => Ok(if status.local_model_loaded { Route::Local } else { Route::Cloud }),
        RoutingMode::Cloud => Ok(if status.cloud_available { Route::Cloud } else { Route::Local }),
        RoutingMode::Auto => {
            if complexity >= config.threshold {
                Ok(if status.cloud_available { Route::Cloud } else { Route::Local })
            } else {
                Ok(if status.local_model_loaded { Route::Local } else { Route::Cloud })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(local: bool, cloud: bool) -> ExecutorStatus {
        ExecutorStatus { local_model_loaded: local, cloud_available: cloud }
    }

    #[test]
    fn priority_thresholds() {
        assert_eq!(derive_priority(8, false), Priority::Urgent);
        assert_eq!(derive_priority(0, true), Priority::Urgent);
        assert_eq!(derive_priority(4, false), Priority::Normal);
        assert_eq!(derive_priority(3, false), Priority::Background);
    }

    #[test]
    fn privacy_forces_local_regardless_of_mode_p2() {
        let config = RouterConfig { mode: RoutingMode::Cloud, threshold: 6, privacy_mode: false };
        let route = decide_route(true, false, 0, &config, &status(true, true)).unwrap();
        assert_eq!(route, Route::Local);
    }

    #[test]
    fn privacy_with_no_local_executor_refuses() {
        let config = RouterConfig::default();
        let err = decide_route(true, false, 0, &config, &status(false, true)).unwrap_err();
        assert!(matches!(err, RouterError::NoExecutorAvailable));
    }

    #[test]
    fn realtime_with_local_loaded_wins_before_mode_rules() {
        let config = RouterConfig { mode: RoutingMode::Cloud, threshold: 6, privacy_mode: false };
        let route = decide_route(false, true, 0, &config, &status(true, true)).unwrap();
        assert_eq!(route, Route::Local);
    }

    #[test]
    fn mode_local_falls_back_to_cloud_when_unavailable() {
        let config = RouterConfig { mode: RoutingMode::Local, threshold: 6, privacy_mode: false };
        let route = decide_route(false, false, 0, &config, &status(false, true)).unwrap();
        assert_eq!(route, Route::Cloud);
    }

    #[test]
    fn mode_cloud_falls_back_to_local_when_unavailable() {
        let config = RouterConfig { mode: RoutingMode::Cloud, threshold: 6, privacy_mode: false };
        let route = decide_route(false, false, 0, &config, &status(true, false)).unwrap();
        assert_eq!(route, Route::Local);
    }

    #[test]
    fn auto_mode_above_threshold_prefers_cloud() {
        let config = RouterConfig { mode: RoutingMode::Auto, threshold: 6, privacy_mode: false };
        let route = decide_route(false, false, 7, &config, &status(true, true)).unwrap();
        assert_eq!(route, Route::Cloud);
    }

    #[test]
    fn auto_mode_below_threshold_prefers_local() {
        let config = RouterConfig { mode: RoutingMode::Auto, threshold: 6, privacy_mode: false };
        let route = decide_route(false, false, 2, &config, &status(true, true)).unwrap();
        assert_eq!(route, Route::Local);
    }

    #[test]
    fn auto_mode_above_threshold_falls_back_to_local_when_cloud_unavailable() {
        let config = RouterConfig { mode: RoutingMode::Auto, threshold: 6, privacy_mode: false };
        let route = decide_route(false, false, 9, &config, &status(true, false)).unwrap();
        assert_eq!(route, Route::Local);
    }
}
