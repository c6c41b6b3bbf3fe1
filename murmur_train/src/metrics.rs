use std::fmt;

use serde::Serialize;

use murmur_core::MurmurError;

/// Counts indexed by `[true class][predicted class]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    classes: Vec<String>,
    counts: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    pub fn new(classes: Vec<String>) -> Self {
        let n = classes.len();
        Self {
            classes,
            counts: vec![vec![0; n]; n],
        }
    }

    /// Builds a matrix from `(true, predicted)` class index pairs.
    pub fn from_pairs(
        classes: Vec<String>,
        pairs: impl IntoIterator<Item = (usize, usize)>,
    ) -> Result<Self, MurmurError> {
        let mut matrix = Self::new(classes);
        for (truth, predicted) in pairs {
            matrix.record(truth, predicted)?;
        }
        Ok(matrix)
    }

    pub fn record(&mut self, truth: usize, predicted: usize) -> Result<(), MurmurError> {
        let n = self.classes.len();
        if truth >= n {
            return Err(MurmurError::UnknownClass(truth));
        }
        if predicted >= n {
            return Err(MurmurError::UnknownClass(predicted));
        }
        self.counts[truth][predicted] += 1;
        Ok(())
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn count(&self, truth: usize, predicted: usize) -> usize {
        self.counts[truth][predicted]
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    pub fn correct(&self) -> usize {
        (0..self.classes.len()).map(|i| self.counts[i][i]).sum()
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.correct(), self.total())
    }

    /// Number of samples whose true class is `class`.
    pub fn support(&self, class: usize) -> usize {
        self.counts[class].iter().sum()
    }

    pub fn precision(&self, class: usize) -> f64 {
        let predicted: usize = self.counts.iter().map(|row| row[class]).sum();
        ratio(self.counts[class][class], predicted)
    }

    pub fn recall(&self, class: usize) -> f64 {
        ratio(self.counts[class][class], self.support(class))
    }

    pub fn f1(&self, class: usize) -> f64 {
        let (p, r) = (self.precision(class), self.recall(class));
        if p + r == 0.0 { 0.0 } else { 2.0 * p * r / (p + r) }
    }
}

/// Undefined ratios count as zero.
fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub name: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Per-class precision/recall/F1 with accuracy, macro and weighted averages.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClassificationReport {
    pub classes: Vec<ClassMetrics>,
    pub accuracy: f64,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
    pub confusion: ConfusionMatrix,
}

impl ClassificationReport {
    pub fn new(confusion: ConfusionMatrix) -> Self {
        let classes: Vec<ClassMetrics> = confusion
            .classes()
            .iter()
            .enumerate()
            .map(|(i, name)| ClassMetrics {
                name: name.clone(),
                precision: confusion.precision(i),
                recall: confusion.recall(i),
                f1: confusion.f1(i),
                support: confusion.support(i),
            })
            .collect();

        let total = confusion.total();
        let n = classes.len().max(1) as f64;
        let mean = |f: fn(&ClassMetrics) -> f64| classes.iter().map(f).sum::<f64>() / n;
        let weighted = |f: fn(&ClassMetrics) -> f64| {
            if total == 0 {
                0.0
            } else {
                classes.iter().map(|c| f(c) * c.support as f64).sum::<f64>() / total as f64
            }
        };

        let macro_avg = ClassMetrics {
            name: "macro avg".to_string(),
            precision: mean(|c| c.precision),
            recall: mean(|c| c.recall),
            f1: mean(|c| c.f1),
            support: total,
        };
        let weighted_avg = ClassMetrics {
            name: "weighted avg".to_string(),
            precision: weighted(|c| c.precision),
            recall: weighted(|c| c.recall),
            f1: weighted(|c| c.f1),
            support: total,
        };

        Self {
            accuracy: confusion.accuracy(),
            classes,
            macro_avg,
            weighted_avg,
            confusion,
        }
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .classes
            .iter()
            .map(|c| c.name.len())
            .chain([self.weighted_avg.name.len()])
            .max()
            .unwrap_or_default();

        let row = |f: &mut fmt::Formatter<'_>, m: &ClassMetrics| {
            writeln!(
                f,
                "{:>width$}  {:>9.2} {:>9.2} {:>9.2} {:>9}",
                m.name, m.precision, m.recall, m.f1, m.support
            )
        };

        writeln!(
            f,
            "{:>width$}  {:>9} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        writeln!(f)?;
        for class in &self.classes {
            row(f, class)?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>width$}  {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy",
            "",
            "",
            self.accuracy,
            self.confusion.total()
        )?;
        row(f, &self.macro_avg)?;
        row(f, &self.weighted_avg)?;

        writeln!(f)?;
        writeln!(f, "confusion matrix (rows: true, columns: predicted)")?;
        write!(f, "{:>width$} ", "")?;
        for name in self.confusion.classes() {
            write!(f, " {name:>9}")?;
        }
        writeln!(f)?;
        for (i, name) in self.confusion.classes().iter().enumerate() {
            write!(f, "{name:>width$} ")?;
            for j in 0..self.confusion.classes().len() {
                write!(f, " {:>9}", self.confusion.count(i, j))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
