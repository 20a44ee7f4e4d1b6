use indicatif::ProgressStyle;

const LABEL_WIDTH: usize = 32;

/// Extension trait for creating progress bar styles with a fixed-width label.
pub trait NamedProgress {
    /// Creates a progress bar style labelled `name`.
    fn named_bar(name: &str) -> Self;
}

impl NamedProgress for ProgressStyle {
    fn named_bar(name: &str) -> Self {
        let fmt = format!(
            "{:<width$}{{wide_bar:40.cyan/blue}} {{pos:>4}}/{{len:<4}} [{{elapsed_precise}} ({{eta}} remaining)] {{msg}}",
            name,
            width = LABEL_WIDTH
        );
        ProgressStyle::default_bar()
            .template(&fmt)
            .unwrap_or(ProgressStyle::default_bar())
    }
}
