//! Migration progress
//!
//! A single [`Progress`] value is updated in place and handed to the caller's
//! sink after every step. Sinks get a borrow, so anything kept past the call
//! has to be cloned.

use serde::Serialize;

/// What kind of bulk operation is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressKind {
    Export,
    Resave,
}

/// Progress inside the store currently being processed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SubProgress {
    pub current: usize,
    pub max: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Progress {
    /// Store currently being processed
    pub filename: String,
    /// Stores finished so far
    pub current: usize,
    /// Stores in total
    pub max: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<SubProgress>,
    #[serde(rename = "type")]
    pub kind: ProgressKind,
}

impl Progress {
    /// Progress of a re-save pass over `max` stores
    pub fn resave(max: usize) -> Self {
        Self {
            filename: String::new(),
            current: 0,
            max,
            sub: None,
            kind: ProgressKind::Resave,
        }
    }

    /// Fraction of the whole operation done, counting partial stores
    pub fn fraction(&self) -> f64 {
        if self.max == 0 {
            return 1.0;
        }

        let partial = match self.sub {
            Some(sub) if sub.max > 0 => sub.current as f64 / sub.max as f64,
            _ => 0.0,
        };
        ((self.current as f64 + partial) / self.max as f64).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_shape() {
        let mut progress = Progress::resave(3);
        progress.filename = "accounts".into();
        progress.sub = Some(SubProgress { current: 100, max: 250 });

        let json = serde_json::to_value(&progress).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "filename": "accounts",
                "current": 0,
                "max": 3,
                "sub": {"current": 100, "max": 250},
                "type": "resave"
            })
        );
    }

    #[test]
    fn test_fraction() {
        let mut progress = Progress::resave(2);
        assert_eq!(progress.fraction(), 0.0);

        progress.current = 1;
        progress.sub = Some(SubProgress { current: 50, max: 100 });
        assert_eq!(progress.fraction(), 0.75);

        assert_eq!(Progress::resave(0).fraction(), 1.0);
    }
}
