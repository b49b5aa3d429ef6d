//! Delay strategy between certificates in the drain loop.

use std::str::FromStr;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Pause inserted between consecutive certificates while draining a
/// batch. Jitter keeps bursts of identical timestamps out of the
/// issuance records and spreads load on downstream storage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Pacing {
    /// No pause. Used by tests and backfills.
    None,
    /// Fixed pause in milliseconds.
    Fixed { millis: u64 },
    /// Uniformly random pause from `min_millis..max_millis`.
    Jittered { min_millis: u64, max_millis: u64 },
}

impl Default for Pacing {
    fn default() -> Self {
        Pacing::Jittered {
            min_millis: 500,
            max_millis: 2000,
        }
    }
}

impl Pacing {
    /// Sleeps for the configured pause, if any.
    pub async fn pause(&self) {
        let millis = match *self {
            Pacing::None => return,
            Pacing::Fixed { millis } => millis,
            Pacing::Jittered {
                min_millis,
                max_millis,
            } => {
                if min_millis >= max_millis {
                    min_millis
                } else {
                    rand::thread_rng().gen_range(min_millis..max_millis)
                }
            }
        };
        if millis > 0 {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
    }
}

/// Accepts `none`, `fixed:<ms>` or `jitter:<min>..<max>`.
impl FromStr for Pacing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("none") {
            return Ok(Pacing::None);
        }
        if let Some(millis) = s.strip_prefix("fixed:") {
            let millis = millis
                .trim()
                .parse()
                .map_err(|_| format!("invalid fixed pacing '{}'", s))?;
            return Ok(Pacing::Fixed { millis });
        }
        if let Some(range) = s.strip_prefix("jitter:") {
            let (min, max) = range
                .split_once("..")
                .ok_or_else(|| format!("invalid jitter pacing '{}', expected jitter:<min>..<max>", s))?;
            let min_millis = min
                .trim()
                .parse()
                .map_err(|_| format!("invalid jitter minimum in '{}'", s))?;
            let max_millis = max
                .trim()
                .parse()
                .map_err(|_| format!("invalid jitter maximum in '{}'", s))?;
            if max_millis < min_millis {
                return Err(format!("jitter maximum below minimum in '{}'", s));
            }
            return Ok(Pacing::Jittered {
                min_millis,
                max_millis,
            });
        }
        Err(format!(
            "unknown pacing '{}', expected none, fixed:<ms> or jitter:<min>..<max>",
            s
        ))
    }
}
