//! Random forest of CART classification trees.
//!
//! Trees are grown on the full training set (no bootstrap) with Gini
//! impurity. At every split `floor(sqrt(n_features))` candidate features are
//! drawn without replacement; constant features do not count towards that
//! budget, so the draw keeps going until enough varying features were seen
//! or all features were tried. Tree seeds derive from `random_state`, so a
//! fit is reproducible.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::common::config::TrainCfg;
use crate::common::error::{AttrResult, AttritionError};

/// Forest hyperparameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub random_state: u64,
}

impl From<&TrainCfg> for ForestParams {
    fn from(cfg: &TrainCfg) -> Self {
        Self {
            n_estimators: cfg.n_estimators,
            max_depth: cfg.max_depth,
            random_state: cfg.random_state,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Node {
    Leaf {
        proba: [f64; 2],
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// One tree stored as an arena; node 0 is the root.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    fn proba(&self, row: &[f64]) -> [f64; 2] {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { proba } => return *proba,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => idx = if row[*feature] <= *threshold { *left } else { *right },
            }
        }
    }

    /// Child indices must point forward and features must be in range, so
    /// traversal terminates without bounds failures.
    fn check(&self, n_features: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".into());
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            if let Node::Split {
                feature,
                left,
                right,
                ..
            } = node
            {
                if *feature >= n_features {
                    return Err(format!("node {idx} splits on feature {feature} of {n_features}"));
                }
                for child in [left, right] {
                    if *child <= idx || *child >= self.nodes.len() {
                        return Err(format!("node {idx} has invalid child {child}"));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }
}

struct TreeBuilder<'a> {
    x: &'a [Vec<f64>],
    y: &'a [u8],
    n_features: usize,
    max_features: usize,
    max_depth: usize,
    rng: ChaCha8Rng,
    nodes: Vec<Node>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

impl TreeBuilder<'_> {
    fn build(mut self) -> DecisionTree {
        let all: Vec<usize> = (0..self.y.len()).collect();
        self.grow(all, 0);
        DecisionTree { nodes: self.nodes }
    }

    fn grow(&mut self, samples: Vec<usize>, depth: usize) -> usize {
        let idx = self.nodes.len();
        let counts = class_counts(self.y, &samples);
        let n = samples.len() as f64;
        self.nodes.push(Node::Leaf {
            proba: [counts[0] as f64 / n, counts[1] as f64 / n],
        });

        let pure = counts[0] == 0 || counts[1] == 0;
        if pure || depth >= self.max_depth || samples.len() < 2 {
            return idx;
        }
        let Some(best) = self.best_split(&samples, counts) else {
            return idx;
        };

        let (left, right): (Vec<usize>, Vec<usize>) = samples
            .into_iter()
            .partition(|&s| self.x[s][best.feature] <= best.threshold);
        let left_idx = self.grow(left, depth + 1);
        let right_idx = self.grow(right, depth + 1);
        self.nodes[idx] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left: left_idx,
            right: right_idx,
        };
        idx
    }

    fn best_split(&mut self, samples: &[usize], counts: [usize; 2]) -> Option<BestSplit> {
        let mut order: Vec<usize> = (0..self.n_features).collect();
        order.shuffle(&mut self.rng);

        let mut best: Option<BestSplit> = None;
        let mut visited = 0;
        for feature in order {
            if visited >= self.max_features {
                break;
            }
            let mut sorted: Vec<(f64, u8)> = samples
                .iter()
                .map(|&s| (self.x[s][feature], self.y[s]))
                .collect();
            sorted.sort_by(|a, b| a.0.total_cmp(&b.0));
            if sorted.first().map(|f| f.0) == sorted.last().map(|l| l.0) {
                continue;
            }
            visited += 1;

            let total = sorted.len() as f64;
            let mut left = [0usize; 2];
            for i in 0..sorted.len() - 1 {
                left[sorted[i].1 as usize] += 1;
                if sorted[i].0 == sorted[i + 1].0 {
                    continue;
                }
                let right = [counts[0] - left[0], counts[1] - left[1]];
                let n_left = (i + 1) as f64;
                let n_right = total - n_left;
                let impurity = (n_left * gini(left) + n_right * gini(right)) / total;
                if best.as_ref().map_or(true, |b| impurity < b.impurity) {
                    best = Some(BestSplit {
                        feature,
                        threshold: (sorted[i].0 + sorted[i + 1].0) / 2.0,
                        impurity,
                    });
                }
            }
        }
        best
    }
}

fn class_counts(y: &[u8], samples: &[usize]) -> [usize; 2] {
    let mut counts = [0usize; 2];
    for &s in samples {
        counts[y[s] as usize] += 1;
    }
    counts
}

fn gini(counts: [usize; 2]) -> f64 {
    let n = (counts[0] + counts[1]) as f64;
    if n == 0.0 {
        return 0.0;
    }
    let p0 = counts[0] as f64 / n;
    let p1 = counts[1] as f64 / n;
    1.0 - p0 * p0 - p1 * p1
}

/// Binary random forest classifier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    n_features: usize,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    /// Fit on a row-major matrix and 0/1 labels.
    pub fn fit(x: &[Vec<f64>], y: &[u8], params: &ForestParams) -> AttrResult<Self> {
        if x.is_empty() {
            return Err(AttritionError::invalid("cannot train on an empty table"));
        }
        if x.len() != y.len() {
            return Err(AttritionError::invalid(format!(
                "feature rows ({}) and labels ({}) differ in length",
                x.len(),
                y.len()
            )));
        }
        if let Some(bad) = y.iter().find(|&&v| v > 1) {
            return Err(AttritionError::invalid(format!("labels must be 0 or 1, got {bad}")));
        }
        let n_features = x[0].len();
        if n_features == 0 {
            return Err(AttritionError::invalid("training table has no feature columns"));
        }
        if let Some(row) = x.iter().position(|r| r.len() != n_features) {
            return Err(AttritionError::invalid(format!(
                "row {} has {} features, expected {n_features}",
                row + 1,
                x[row].len()
            )));
        }
        if params.n_estimators == 0 || params.max_depth == 0 {
            return Err(AttritionError::config(
                "n_estimators and max_depth must be at least 1",
            ));
        }

        let max_features = candidate_count(n_features);
        let mut seeds = ChaCha8Rng::seed_from_u64(params.random_state);
        let trees = (0..params.n_estimators)
            .map(|_| {
                TreeBuilder {
                    x,
                    y,
                    n_features,
                    max_features,
                    max_depth: params.max_depth,
                    rng: ChaCha8Rng::seed_from_u64(seeds.gen()),
                    nodes: Vec::new(),
                }
                .build()
            })
            .collect();
        Ok(Self { n_features, trees })
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    /// Verify a deserialized forest is internally consistent.
    pub fn check(&self) -> Result<(), String> {
        if self.trees.is_empty() {
            return Err("forest has no trees".into());
        }
        self.trees
            .iter()
            .enumerate()
            .try_for_each(|(i, t)| t.check(self.n_features).map_err(|e| format!("tree {i}: {e}")))
    }

    /// Class probabilities averaged over the trees.
    pub fn predict_proba_row(&self, row: &[f64]) -> AttrResult<[f64; 2]> {
        if row.len() != self.n_features {
            return Err(AttritionError::invalid(format!(
                "expected {} features, got {}",
                self.n_features,
                row.len()
            )));
        }
        let mut sum = [0.0; 2];
        for tree in &self.trees {
            let p = tree.proba(row);
            sum[0] += p[0];
            sum[1] += p[1];
        }
        let n = self.trees.len() as f64;
        Ok([sum[0] / n, sum[1] / n])
    }

    /// 1 iff the positive class is strictly more probable.
    pub fn predict_row(&self, row: &[f64]) -> AttrResult<u8> {
        let [p0, p1] = self.predict_proba_row(row)?;
        Ok(u8::from(p1 > p0))
    }
}

/// Features drawn per split: `floor(sqrt(n))`, at least one.
fn candidate_count(n_features: usize) -> usize {
    ((n_features as f64).sqrt() as usize).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_count_rounds_down() {
        assert_eq!(candidate_count(1), 1);
        assert_eq!(candidate_count(2), 1);
        assert_eq!(candidate_count(15), 3);
        assert_eq!(candidate_count(16), 4);
    }

    fn params(n_estimators: usize, max_depth: usize) -> ForestParams {
        ForestParams {
            n_estimators,
            max_depth,
            random_state: 42,
        }
    }

    fn separable() -> (Vec<Vec<f64>>, Vec<u8>) {
        // second column carries the signal, first is constant
        let x: Vec<Vec<f64>> = (0..20).map(|i| vec![1.0, i as f64]).collect();
        let y = (0..20).map(|i| u8::from(i >= 10)).collect();
        (x, y)
    }

    #[test]
    fn learns_a_threshold_past_constant_features() {
        let (x, y) = separable();
        let forest = RandomForest::fit(&x, &y, &params(5, 3)).unwrap();
        assert_eq!(forest.predict_row(&[1.0, 2.0]).unwrap(), 0);
        assert_eq!(forest.predict_row(&[1.0, 17.0]).unwrap(), 1);
        let [p0, p1] = forest.predict_proba_row(&[1.0, 17.0]).unwrap();
        assert!((p0 + p1 - 1.0).abs() < 1e-12);
        assert_eq!(p1, 1.0);
    }

    #[test]
    fn fit_is_deterministic_per_seed() {
        let x: Vec<Vec<f64>> = (0..30).map(|i| vec![(i % 7) as f64, (i % 3) as f64, (i % 5) as f64]).collect();
        let y: Vec<u8> = (0..30).map(|i| u8::from(i % 7 > 3)).collect();
        let a = RandomForest::fit(&x, &y, &params(10, 4)).unwrap();
        let b = RandomForest::fit(&x, &y, &params(10, 4)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn respects_max_depth() {
        let x: Vec<Vec<f64>> = (0..40).map(|i| vec![i as f64]).collect();
        let y: Vec<u8> = (0..40).map(|i| (i % 2) as u8).collect();
        let forest = RandomForest::fit(&x, &y, &params(3, 2)).unwrap();
        assert!(forest.trees().iter().all(|t| t.depth() <= 2));
    }

    #[test]
    fn single_class_gives_certain_leaf() {
        let x = vec![vec![1.0], vec![2.0]];
        let forest = RandomForest::fit(&x, &[0, 0], &params(2, 3)).unwrap();
        assert_eq!(forest.predict_proba_row(&[5.0]).unwrap(), [1.0, 0.0]);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(RandomForest::fit(&[], &[], &params(1, 1)).is_err());
        assert!(RandomForest::fit(&[vec![1.0]], &[2], &params(1, 1)).is_err());
        assert!(RandomForest::fit(&[vec![1.0], vec![1.0, 2.0]], &[0, 1], &params(1, 1)).is_err());
        let forest = RandomForest::fit(&[vec![1.0], vec![2.0]], &[0, 1], &params(1, 1)).unwrap();
        assert!(forest.predict_proba_row(&[1.0, 2.0]).is_err());
    }

    #[test]
    fn check_catches_corrupt_trees() {
        let (x, y) = separable();
        let forest = RandomForest::fit(&x, &y, &params(2, 2)).unwrap();
        assert!(forest.check().is_ok());
        let mut json = serde_json::to_value(&forest).unwrap();
        json["n_features"] = serde_json::json!(1);
        let shrunk: RandomForest = serde_json::from_value(json).unwrap();
        assert!(shrunk.check().is_err());
    }
}
