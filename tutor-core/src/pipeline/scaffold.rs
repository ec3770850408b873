/// Decides whether a question is a scaffold question.
///
/// Scaffold questions work through partially written code, so retrieved
/// segments containing `?` placeholders stay in the context for them.
pub trait ScaffoldDetector: Send + Sync {
    fn is_scaffold(&self, question: &str) -> bool;
}

impl<F> ScaffoldDetector for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_scaffold(&self, question: &str) -> bool {
        self(question)
    }
}

/// Question mark plus a data-frame marker such as `df[` or `groupby`.
#[derive(Debug, Clone)]
pub struct DataFrameScaffold {
    markers: Vec<String>,
}

impl DataFrameScaffold {
    pub fn new(markers: Vec<String>) -> Self {
        Self { markers }
    }
}

impl Default for DataFrameScaffold {
    fn default() -> Self {
        Self::new(vec!["df[".to_string(), "groupby".to_string()])
    }
}

impl ScaffoldDetector for DataFrameScaffold {
    fn is_scaffold(&self, question: &str) -> bool {
        question.contains('?') && self.markers.iter().any(|m| question.contains(m.as_str()))
    }
}

/// Drops `?`-bearing segments unless the question is a scaffold question.
pub fn filter_segments(segments: Vec<String>, scaffold: bool) -> Vec<String> {
    if scaffold {
        segments
    } else {
        segments.into_iter().filter(|s| !s.contains('?')).collect()
    }
}
