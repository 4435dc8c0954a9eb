use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Point-in-time view of a research call tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchProgress {
    pub current_depth: usize,
    pub total_depth: usize,
    pub current_breadth: usize,
    pub total_breadth: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_query: Option<String>,
    pub total_queries: usize,
    pub completed_queries: usize,
}

pub type ProgressCallback = Arc<dyn Fn(&ResearchProgress) + Send + Sync>;

/// Progress sink shared by every level of one call tree.
///
/// Updates are serialized and the callback runs while the update lock is held,
/// so observers see `completed_queries` in non-decreasing order. Callbacks
/// must not block.
#[derive(Clone)]
pub struct ProgressReporter {
    state: Arc<Mutex<ResearchProgress>>,
    callback: Option<ProgressCallback>,
}

impl ProgressReporter {
    pub fn new(breadth: usize, depth: usize, callback: Option<ProgressCallback>) -> Self {
        let initial = ResearchProgress {
            current_depth: depth,
            total_depth: depth,
            current_breadth: breadth,
            total_breadth: breadth,
            ..ResearchProgress::default()
        };
        ProgressReporter {
            state: Arc::new(Mutex::new(initial)),
            callback,
        }
    }

    pub fn silent(breadth: usize, depth: usize) -> Self {
        Self::new(breadth, depth, None)
    }

    pub fn snapshot(&self) -> ResearchProgress {
        match self.state.lock() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// A level planned `count` queries; `first_query` becomes the current one.
    pub fn queries_planned(
        &self,
        count: usize,
        first_query: Option<&str>,
        depth: usize,
        breadth: usize,
    ) {
        self.update(|p| {
            p.total_queries += count;
            p.current_depth = depth;
            p.current_breadth = breadth;
            if let Some(query) = first_query {
                p.current_query = Some(query.to_string());
            }
        });
    }

    /// One planned query settled, successfully or not.
    pub fn query_completed(&self, query: &str, depth: usize, breadth: usize) {
        self.update(|p| {
            p.completed_queries += 1;
            p.current_depth = depth;
            p.current_breadth = breadth;
            p.current_query = Some(query.to_string());
        });
    }

    fn update<F: FnOnce(&mut ResearchProgress)>(&self, apply: F) {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        apply(&mut state);
        if let Some(callback) = &self.callback {
            callback(&state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_snapshot() {
        let reporter = ProgressReporter::silent(4, 2);
        let p = reporter.snapshot();
        assert_eq!(p.total_breadth, 4);
        assert_eq!(p.total_depth, 2);
        assert_eq!(p.current_depth, 2);
        assert_eq!(p.total_queries, 0);
        assert_eq!(p.completed_queries, 0);
        assert!(p.current_query.is_none());
    }

    #[test]
    fn test_callback_sees_every_update() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let reporter = ProgressReporter::new(
            2,
            1,
            Some(Arc::new(move |p: &ResearchProgress| {
                sink.lock().unwrap().push((p.total_queries, p.completed_queries));
            })),
        );

        reporter.queries_planned(2, Some("first"), 1, 2);
        reporter.query_completed("first", 0, 1);
        reporter.query_completed("second", 0, 1);

        assert_eq!(*seen.lock().unwrap(), vec![(2, 0), (2, 1), (2, 2)]);
        let p = reporter.snapshot();
        assert_eq!(p.current_query.as_deref(), Some("second"));
        assert_eq!(p.current_depth, 0);
    }

    #[test]
    fn test_clones_share_state() {
        let reporter = ProgressReporter::silent(1, 1);
        let child = reporter.clone();
        child.queries_planned(3, None, 1, 1);
        child.query_completed("q", 0, 1);
        assert_eq!(reporter.snapshot().total_queries, 3);
        assert_eq!(reporter.snapshot().completed_queries, 1);
    }

    #[test]
    fn test_serializes_camel_case() {
        let json = serde_json::to_value(ProgressReporter::silent(2, 1).snapshot()).unwrap();
        assert_eq!(json["totalBreadth"], 2);
        assert_eq!(json["completedQueries"], 0);
        assert!(json.get("currentQuery").is_none());
    }
}
