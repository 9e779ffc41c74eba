//! Arena-backed hypothesis tree with evidence scoring and prune/confirm logic.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{EvidenceQuery, EvidenceStrength, Hypothesis, HypothesisCategory, HypothesisStatus};
use crate::error::{HypothesisError, HypothesisResult};

/// Base confidence per strongest evidence tier.
const BASE_STRONG: i32 = 70;
const BASE_WEAK: i32 = 35;
/// Bonus per additional corroborating strong signal, capped at this score.
const CORROBORATION_BONUS: i32 = 5;
const CORROBORATION_CAP: i32 = 95;
/// Penalty per refuting signal.
const REFUTATION_PENALTY: i32 = 10;

/// The hypothesis tree engine.
///
/// Nodes live in an arena keyed by id; parent/child links are ids, never
/// references, and the tree view is reconstructed by index lookup. All
/// mutations validate first and leave the tree untouched on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HypothesisTree {
    nodes: HashMap<String, Hypothesis>,
    /// All node ids in insertion order (roots and children alike).
    order: Vec<String>,
    /// Root hypothesis ids in creation order.
    roots: Vec<String>,
    max_depth: u32,
}

impl HypothesisTree {
    /// Create an empty tree with the given maximum depth (roots are depth 0)
    pub fn new(max_depth: u32) -> Self {
        Self {
            nodes: HashMap::new(),
            order: Vec::new(),
            roots: Vec::new(),
            max_depth,
        }
    }

    /// Rebuild a tree from a flattened snapshot (checkpoint restore).
    ///
    /// Node order in the snapshot is preserved; parent/child links are taken
    /// from the nodes themselves.
    pub fn from_snapshot(snapshot: Vec<Hypothesis>, max_depth: u32) -> Self {
        let mut tree = Self::new(max_depth);
        for hyp in snapshot {
            if hyp.parent_id.is_none() {
                tree.roots.push(hyp.id.clone());
            }
            tree.order.push(hyp.id.clone());
            tree.nodes.insert(hyp.id.clone(), hyp);
        }
        tree
    }

    /// Flattened value-copy of every node, in insertion order
    pub fn snapshot(&self) -> Vec<Hypothesis> {
        self.order
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .cloned()
            .collect()
    }

    /// Propose a new hypothesis under `parent_id` (or as a root)
    pub fn propose(
        &mut self,
        parent_id: Option<&str>,
        statement: impl Into<String>,
        category: HypothesisCategory,
    ) -> HypothesisResult<Hypothesis> {
        let hyp = match parent_id {
            Some(pid) => {
                let parent = self.get_required(pid)?;
                let depth = parent.depth + 1;
                if depth > self.max_depth {
                    return Err(HypothesisError::DepthExceeded {
                        depth,
                        max_depth: self.max_depth,
                    });
                }
                Hypothesis::new(statement, category).with_parent(pid, parent.depth)
            }
            None => Hypothesis::new(statement, category),
        };

        if let Some(pid) = parent_id {
            if let Some(parent) = self.nodes.get_mut(pid) {
                parent.children.push(hyp.id.clone());
            }
        } else {
            self.roots.push(hyp.id.clone());
        }

        debug!(
            hypothesis_id = %hyp.id,
            depth = hyp.depth,
            category = %hyp.category,
            "Hypothesis proposed"
        );

        self.order.push(hyp.id.clone());
        self.nodes.insert(hyp.id.clone(), hyp.clone());
        Ok(hyp)
    }

    /// Record an evidence-gathering result against a hypothesis.
    ///
    /// Evidence strength ratchets upward within the current testing pass
    /// (strong > weak > none); confidence is recomputed as a pure function of
    /// the pass's evidence sequence. The first evidence moves a `Pending`
    /// hypothesis to `Investigating`. Recording against a `Confirmed`
    /// hypothesis is a no-op returning current state; against a `Pruned`
    /// hypothesis it fails with `InvalidTransition`.
    pub fn record_evidence(
        &mut self,
        hypothesis_id: &str,
        query: impl Into<String>,
        result: serde_json::Value,
        classification: EvidenceStrength,
        reasoning: impl Into<String>,
    ) -> HypothesisResult<Hypothesis> {
        // Validate before touching state
        {
            let hyp = self.get_required(hypothesis_id)?;
            match hyp.status {
                HypothesisStatus::Pruned => {
                    return Err(HypothesisError::InvalidTransition {
                        hypothesis_id: hypothesis_id.to_string(),
                        reason: "cannot record evidence on a pruned hypothesis".to_string(),
                    });
                }
                HypothesisStatus::Confirmed => {
                    debug!(hypothesis_id, "Evidence ignored: hypothesis already confirmed");
                    return Ok(hyp.clone());
                }
                _ => {}
            }
        }

        let reasoning = reasoning.into();
        let hyp = self
            .nodes
            .get_mut(hypothesis_id)
            .ok_or_else(|| HypothesisError::NotFound {
                hypothesis_id: hypothesis_id.to_string(),
            })?;

        let record = EvidenceQuery::new(
            query,
            result,
            classification,
            reasoning.clone(),
            hyp.test_pass,
        );
        hyp.queries.push(record);

        if hyp.status == HypothesisStatus::Pending {
            hyp.status = HypothesisStatus::Investigating;
        }

        // One-way ratchet within the current pass
        hyp.evidence_strength = hyp.evidence_strength.max(classification);

        match classification {
            EvidenceStrength::None => hyp.refuting_evidence.push(reasoning),
            _ => hyp.confirming_evidence.push(reasoning),
        }

        hyp.confidence = score_evidence(
            &hyp.queries
                .iter()
                .filter(|q| q.pass == hyp.test_pass)
                .collect::<Vec<_>>(),
        );
        hyp.updated_at = chrono::Utc::now();

        info!(
            hypothesis_id,
            strength = %hyp.evidence_strength,
            confidence = hyp.confidence,
            "Evidence recorded"
        );

        Ok(hyp.clone())
    }

    /// Branch a strongly-evidenced hypothesis into child hypotheses.
    ///
    /// Only legal when the parent's evidence strength is `Strong` and the
    /// children would not exceed the depth limit. Children inherit the
    /// parent's category and start `Pending`.
    pub fn branch(
        &mut self,
        hypothesis_id: &str,
        child_statements: &[&str],
    ) -> HypothesisResult<Vec<Hypothesis>> {
        let (category, depth) = {
            let parent = self.get_required(hypothesis_id)?;
            if parent.evidence_strength != EvidenceStrength::Strong {
                return Err(HypothesisError::InvalidTransition {
                    hypothesis_id: hypothesis_id.to_string(),
                    reason: format!(
                        "branching requires strong evidence, found {}",
                        parent.evidence_strength
                    ),
                });
            }
            if parent.depth + 1 > self.max_depth {
                return Err(HypothesisError::DepthExceeded {
                    depth: parent.depth + 1,
                    max_depth: self.max_depth,
                });
            }
            (parent.category, parent.depth)
        };

        let mut children = Vec::with_capacity(child_statements.len());
        for statement in child_statements {
            let child = Hypothesis::new(*statement, category).with_parent(hypothesis_id, depth);
            self.order.push(child.id.clone());
            self.nodes.insert(child.id.clone(), child.clone());
            children.push(child);
        }
        if let Some(parent) = self.nodes.get_mut(hypothesis_id) {
            parent
                .children
                .extend(children.iter().map(|c| c.id.clone()));
            parent.updated_at = chrono::Utc::now();
        }

        info!(
            hypothesis_id,
            num_children = children.len(),
            "Hypothesis branched"
        );

        Ok(children)
    }

    /// Prune a hypothesis and cascade to all descendants.
    ///
    /// Descendants inherit the reason with an "ancestor pruned" suffix.
    /// Pruning an already-pruned hypothesis is a no-op.
    pub fn prune(&mut self, hypothesis_id: &str, reason: impl Into<String>) -> HypothesisResult<()> {
        let reason = reason.into();
        self.get_required(hypothesis_id)?;

        let mut stack = vec![(hypothesis_id.to_string(), reason.clone())];
        let mut pruned = 0usize;
        while let Some((id, why)) = stack.pop() {
            let Some(node) = self.nodes.get_mut(&id) else {
                continue;
            };
            let child_reason = format!("{} (ancestor pruned)", reason);
            for child in &node.children {
                stack.push((child.clone(), child_reason.clone()));
            }
            if node.status == HypothesisStatus::Pruned {
                continue;
            }
            node.status = HypothesisStatus::Pruned;
            node.status_reason = Some(why);
            node.updated_at = chrono::Utc::now();
            pruned += 1;
        }

        info!(hypothesis_id, pruned, %reason, "Hypothesis pruned");
        Ok(())
    }

    /// Confirm a hypothesis as the root cause.
    ///
    /// Requires strong evidence and no other confirmed hypothesis anywhere in
    /// the tree (single root cause per investigation). Confirming an
    /// already-confirmed hypothesis is a no-op returning current state.
    pub fn confirm(&mut self, hypothesis_id: &str) -> HypothesisResult<Hypothesis> {
        {
            let hyp = self.get_required(hypothesis_id)?;
            match hyp.status {
                HypothesisStatus::Confirmed => return Ok(hyp.clone()),
                HypothesisStatus::Pruned => {
                    return Err(HypothesisError::InvalidTransition {
                        hypothesis_id: hypothesis_id.to_string(),
                        reason: "cannot confirm a pruned hypothesis".to_string(),
                    });
                }
                _ => {}
            }
            if hyp.evidence_strength != EvidenceStrength::Strong {
                return Err(HypothesisError::InvalidTransition {
                    hypothesis_id: hypothesis_id.to_string(),
                    reason: format!(
                        "confirmation requires strong evidence, found {}",
                        hyp.evidence_strength
                    ),
                });
            }
        }
        if let Some(existing) = self.confirmed() {
            return Err(HypothesisError::AmbiguousConfirmation {
                hypothesis_id: hypothesis_id.to_string(),
                confirmed_id: existing.id.clone(),
            });
        }

        let hyp = self
            .nodes
            .get_mut(hypothesis_id)
            .ok_or_else(|| HypothesisError::NotFound {
                hypothesis_id: hypothesis_id.to_string(),
            })?;
        hyp.status = HypothesisStatus::Confirmed;
        hyp.status_reason = Some(format!(
            "confirmed with strong evidence at confidence {}",
            hyp.confidence
        ));
        hyp.updated_at = chrono::Utc::now();

        info!(hypothesis_id, confidence = hyp.confidence, "Hypothesis confirmed");
        Ok(hyp.clone())
    }

    /// Start a new testing pass for a hypothesis, resetting the evidence
    /// ratchet.
    ///
    /// The old pass's ledger entries are kept for audit. Re-testing a
    /// `Confirmed` hypothesis is a no-op returning current state; re-testing
    /// a `Pruned` one fails with `InvalidTransition`.
    pub fn retest(&mut self, hypothesis_id: &str) -> HypothesisResult<Hypothesis> {
        {
            let hyp = self.get_required(hypothesis_id)?;
            match hyp.status {
                HypothesisStatus::Confirmed => return Ok(hyp.clone()),
                HypothesisStatus::Pruned => {
                    return Err(HypothesisError::InvalidTransition {
                        hypothesis_id: hypothesis_id.to_string(),
                        reason: "cannot re-test a pruned hypothesis".to_string(),
                    });
                }
                _ => {}
            }
        }

        let hyp = self
            .nodes
            .get_mut(hypothesis_id)
            .ok_or_else(|| HypothesisError::NotFound {
                hypothesis_id: hypothesis_id.to_string(),
            })?;
        hyp.test_pass += 1;
        hyp.evidence_strength = EvidenceStrength::None;
        hyp.confidence = 0;
        hyp.updated_at = chrono::Utc::now();

        debug!(hypothesis_id, pass = hyp.test_pass, "Hypothesis re-test started");
        Ok(hyp.clone())
    }

    /// Get a hypothesis by id
    pub fn get(&self, hypothesis_id: &str) -> Option<&Hypothesis> {
        self.nodes.get(hypothesis_id)
    }

    /// Root hypotheses in creation order
    pub fn roots(&self) -> Vec<&Hypothesis> {
        self.roots.iter().filter_map(|id| self.nodes.get(id)).collect()
    }

    /// Child hypotheses of a node, in creation order
    pub fn children(&self, hypothesis_id: &str) -> Vec<&Hypothesis> {
        self.nodes
            .get(hypothesis_id)
            .map(|h| {
                h.children
                    .iter()
                    .filter_map(|id| self.nodes.get(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The confirmed hypothesis, if any
    pub fn confirmed(&self) -> Option<&Hypothesis> {
        self.order
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .find(|h| h.status == HypothesisStatus::Confirmed)
    }

    /// Unconfirmed, unpruned hypotheses with strong evidence.
    ///
    /// When more than one sibling reaches strong evidence, none is
    /// auto-confirmed; this is the disambiguation set surfaced to the caller.
    pub fn strong_candidates(&self) -> Vec<&Hypothesis> {
        self.order
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .filter(|h| {
                h.evidence_strength == EvidenceStrength::Strong
                    && h.status == HypothesisStatus::Investigating
            })
            .collect()
    }

    /// Number of hypotheses in the tree
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Maximum depth configured for this tree
    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    fn get_required(&self, hypothesis_id: &str) -> HypothesisResult<&Hypothesis> {
        self.nodes
            .get(hypothesis_id)
            .ok_or_else(|| HypothesisError::NotFound {
                hypothesis_id: hypothesis_id.to_string(),
            })
    }
}

/// Deterministic confidence score over one testing pass's evidence.
///
/// Base score per strongest tier (strong: 70, weak: 35, none: 0), +5 per
/// additional corroborating strong signal up to 95, -10 per refuting signal,
/// clamped to [0, 100].
fn score_evidence(records: &[&EvidenceQuery]) -> u8 {
    let strong = records
        .iter()
        .filter(|q| q.classification == EvidenceStrength::Strong)
        .count() as i32;
    let weak = records
        .iter()
        .filter(|q| q.classification == EvidenceStrength::Weak)
        .count() as i32;
    let refuting = records
        .iter()
        .filter(|q| q.classification == EvidenceStrength::None)
        .count() as i32;

    let base = if strong > 0 {
        BASE_STRONG
    } else if weak > 0 {
        BASE_WEAK
    } else {
        0
    };

    let corroborated = (base + (strong - 1).max(0) * CORROBORATION_BONUS).min(CORROBORATION_CAP);
    (corroborated - refuting * REFUTATION_PENALTY).clamp(0, 100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree() -> HypothesisTree {
        HypothesisTree::new(4)
    }

    fn strong_record(pass: u32) -> EvidenceQuery {
        EvidenceQuery::new("q", json!({}), EvidenceStrength::Strong, "r", pass)
    }

    // ============================================================================
    // Scoring Function Tests
    // ============================================================================

    #[test]
    fn test_score_empty() {
        assert_eq!(score_evidence(&[]), 0);
    }

    #[test]
    fn test_score_single_strong() {
        let r = strong_record(1);
        assert_eq!(score_evidence(&[&r]), 70);
    }

    #[test]
    fn test_score_single_weak() {
        let r = EvidenceQuery::new("q", json!({}), EvidenceStrength::Weak, "r", 1);
        assert_eq!(score_evidence(&[&r]), 35);
    }

    #[test]
    fn test_score_corroboration_bonus() {
        let a = strong_record(1);
        let b = strong_record(1);
        let c = strong_record(1);
        assert_eq!(score_evidence(&[&a, &b]), 75);
        assert_eq!(score_evidence(&[&a, &b, &c]), 80);
    }

    #[test]
    fn test_score_corroboration_capped_at_95() {
        let records: Vec<EvidenceQuery> = (0..10).map(|_| strong_record(1)).collect();
        let refs: Vec<&EvidenceQuery> = records.iter().collect();
        assert_eq!(score_evidence(&refs), 95);
    }

    #[test]
    fn test_score_refutation_penalty() {
        let s = strong_record(1);
        let n = EvidenceQuery::new("q", json!({}), EvidenceStrength::None, "r", 1);
        assert_eq!(score_evidence(&[&s, &n]), 60);
    }

    #[test]
    fn test_score_clamped_at_zero() {
        let records: Vec<EvidenceQuery> = (0..5)
            .map(|_| EvidenceQuery::new("q", json!({}), EvidenceStrength::None, "r", 1))
            .collect();
        let refs: Vec<&EvidenceQuery> = records.iter().collect();
        assert_eq!(score_evidence(&refs), 0);
    }

    // ============================================================================
    // Propose / Depth Tests
    // ============================================================================

    #[test]
    fn test_propose_root() {
        let mut t = tree();
        let hyp = t
            .propose(None, "DB down", HypothesisCategory::Infrastructure)
            .unwrap();
        assert_eq!(hyp.depth, 0);
        assert_eq!(t.len(), 1);
        assert_eq!(t.roots().len(), 1);
    }

    #[test]
    fn test_propose_child_links_parent() {
        let mut t = tree();
        let root = t
            .propose(None, "root", HypothesisCategory::Application)
            .unwrap();
        let child = t
            .propose(Some(&root.id), "child", HypothesisCategory::Application)
            .unwrap();

        assert_eq!(child.depth, 1);
        assert_eq!(child.parent_id, Some(root.id.clone()));
        assert_eq!(t.children(&root.id).len(), 1);
    }

    #[test]
    fn test_propose_depth_exceeded() {
        let mut t = HypothesisTree::new(2);
        let h0 = t.propose(None, "d0", HypothesisCategory::External).unwrap();
        let h1 = t
            .propose(Some(&h0.id), "d1", HypothesisCategory::External)
            .unwrap();
        let h2 = t
            .propose(Some(&h1.id), "d2", HypothesisCategory::External)
            .unwrap();

        let err = t
            .propose(Some(&h2.id), "d3", HypothesisCategory::External)
            .unwrap_err();
        assert!(matches!(
            err,
            HypothesisError::DepthExceeded {
                depth: 3,
                max_depth: 2
            }
        ));
        // Failed mutation leaves the tree unchanged
        assert_eq!(t.len(), 3);
        assert!(t.children(&h2.id).is_empty());
    }

    #[test]
    fn test_propose_unknown_parent() {
        let mut t = tree();
        let err = t
            .propose(Some("missing"), "x", HypothesisCategory::External)
            .unwrap_err();
        assert!(matches!(err, HypothesisError::NotFound { .. }));
    }

    // ============================================================================
    // Evidence Tests
    // ============================================================================

    #[test]
    fn test_record_evidence_transitions_to_investigating() {
        let mut t = tree();
        let h = t.propose(None, "x", HypothesisCategory::Application).unwrap();
        let h = t
            .record_evidence(
                &h.id,
                "metrics.cpu",
                json!({"cpu": 0.99}),
                EvidenceStrength::Weak,
                "cpu saturated",
            )
            .unwrap();

        assert_eq!(h.status, HypothesisStatus::Investigating);
        assert_eq!(h.evidence_strength, EvidenceStrength::Weak);
        assert_eq!(h.confidence, 35);
        assert_eq!(h.queries.len(), 1);
    }

    #[test]
    fn test_evidence_ratchet_never_downgrades() {
        let mut t = tree();
        let h = t.propose(None, "x", HypothesisCategory::Application).unwrap();
        t.record_evidence(&h.id, "q1", json!({}), EvidenceStrength::Strong, "a")
            .unwrap();
        let h = t
            .record_evidence(&h.id, "q2", json!({}), EvidenceStrength::Weak, "b")
            .unwrap();

        assert_eq!(h.evidence_strength, EvidenceStrength::Strong);
    }

    #[test]
    fn test_confidence_deterministic_for_same_history() {
        let run = || {
            let mut t = tree();
            let h = t.propose(None, "x", HypothesisCategory::Dependency).unwrap();
            t.record_evidence(&h.id, "q1", json!({}), EvidenceStrength::Strong, "a")
                .unwrap();
            t.record_evidence(&h.id, "q2", json!({}), EvidenceStrength::Strong, "b")
                .unwrap();
            t.record_evidence(&h.id, "q3", json!({}), EvidenceStrength::None, "c")
                .unwrap()
                .confidence
        };
        assert_eq!(run(), run());
        assert_eq!(run(), 65);
    }

    #[test]
    fn test_record_evidence_on_pruned_fails() {
        let mut t = tree();
        let h = t.propose(None, "x", HypothesisCategory::External).unwrap();
        t.prune(&h.id, "irrelevant").unwrap();

        let err = t
            .record_evidence(&h.id, "q", json!({}), EvidenceStrength::Strong, "r")
            .unwrap_err();
        assert!(matches!(err, HypothesisError::InvalidTransition { .. }));
    }

    #[test]
    fn test_record_evidence_on_confirmed_is_noop() {
        let mut t = tree();
        let h = t.propose(None, "x", HypothesisCategory::External).unwrap();
        t.record_evidence(&h.id, "q", json!({}), EvidenceStrength::Strong, "r")
            .unwrap();
        t.confirm(&h.id).unwrap();

        let before = t.get(&h.id).unwrap().queries.len();
        let after = t
            .record_evidence(&h.id, "q2", json!({}), EvidenceStrength::Weak, "late")
            .unwrap();
        assert_eq!(after.queries.len(), before);
        assert_eq!(after.status, HypothesisStatus::Confirmed);
    }

    #[test]
    fn test_refuting_evidence_appended() {
        let mut t = tree();
        let h = t.propose(None, "x", HypothesisCategory::External).unwrap();
        let h = t
            .record_evidence(&h.id, "q", json!({}), EvidenceStrength::None, "contradicts")
            .unwrap();
        assert_eq!(h.refuting_evidence, vec!["contradicts".to_string()]);
        assert!(h.confirming_evidence.is_empty());
    }

    // ============================================================================
    // Branch Tests
    // ============================================================================

    #[test]
    fn test_branch_requires_strong_evidence() {
        let mut t = tree();
        let h = t.propose(None, "x", HypothesisCategory::Application).unwrap();
        let err = t.branch(&h.id, &["a", "b"]).unwrap_err();
        assert!(matches!(err, HypothesisError::InvalidTransition { .. }));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn test_branch_creates_pending_children() {
        let mut t = tree();
        let h = t.propose(None, "x", HypothesisCategory::Configuration).unwrap();
        t.record_evidence(&h.id, "q", json!({}), EvidenceStrength::Strong, "r")
            .unwrap();

        let children = t.branch(&h.id, &["child a", "child b"]).unwrap();
        assert_eq!(children.len(), 2);
        for c in &children {
            assert_eq!(c.status, HypothesisStatus::Pending);
            assert_eq!(c.depth, 1);
            assert_eq!(c.category, HypothesisCategory::Configuration);
        }
        assert_eq!(t.children(&h.id).len(), 2);
    }

    #[test]
    fn test_branch_at_max_depth_fails() {
        let mut t = HypothesisTree::new(1);
        let h0 = t.propose(None, "d0", HypothesisCategory::External).unwrap();
        t.record_evidence(&h0.id, "q", json!({}), EvidenceStrength::Strong, "r")
            .unwrap();
        let children = t.branch(&h0.id, &["d1"]).unwrap();
        t.record_evidence(&children[0].id, "q", json!({}), EvidenceStrength::Strong, "r")
            .unwrap();

        let err = t.branch(&children[0].id, &["d2"]).unwrap_err();
        assert!(matches!(err, HypothesisError::DepthExceeded { .. }));
    }

    // ============================================================================
    // Prune Tests
    // ============================================================================

    #[test]
    fn test_prune_cascades_to_descendants() {
        let mut t = tree();
        let root = t.propose(None, "root", HypothesisCategory::Application).unwrap();
        t.record_evidence(&root.id, "q", json!({}), EvidenceStrength::Strong, "r")
            .unwrap();
        let kids = t.branch(&root.id, &["a", "b"]).unwrap();
        t.record_evidence(&kids[0].id, "q", json!({}), EvidenceStrength::Strong, "r")
            .unwrap();
        let grandkids = t.branch(&kids[0].id, &["a1"]).unwrap();

        t.prune(&root.id, "wrong subsystem").unwrap();

        assert_eq!(t.get(&root.id).unwrap().status, HypothesisStatus::Pruned);
        assert_eq!(
            t.get(&root.id).unwrap().status_reason.as_deref(),
            Some("wrong subsystem")
        );
        for id in [&kids[0].id, &kids[1].id, &grandkids[0].id] {
            let node = t.get(id).unwrap();
            assert_eq!(node.status, HypothesisStatus::Pruned);
            assert_eq!(
                node.status_reason.as_deref(),
                Some("wrong subsystem (ancestor pruned)")
            );
        }
    }

    #[test]
    fn test_prune_idempotent() {
        let mut t = tree();
        let h = t.propose(None, "x", HypothesisCategory::External).unwrap();
        t.prune(&h.id, "first").unwrap();
        t.prune(&h.id, "second").unwrap();
        // First reason wins; second prune is a no-op
        assert_eq!(t.get(&h.id).unwrap().status_reason.as_deref(), Some("first"));
    }

    #[test]
    fn test_no_pruned_node_has_investigating_descendant() {
        let mut t = tree();
        let root = t.propose(None, "root", HypothesisCategory::Application).unwrap();
        t.record_evidence(&root.id, "q", json!({}), EvidenceStrength::Strong, "r")
            .unwrap();
        let kids = t.branch(&root.id, &["a", "b"]).unwrap();
        t.record_evidence(&kids[1].id, "q", json!({}), EvidenceStrength::Weak, "r")
            .unwrap();

        t.prune(&root.id, "done").unwrap();

        let snapshot = t.snapshot();
        for node in &snapshot {
            if node.status == HypothesisStatus::Pruned {
                for child_id in &node.children {
                    let child = t.get(child_id).unwrap();
                    assert_ne!(child.status, HypothesisStatus::Investigating);
                }
            }
        }
    }

    // ============================================================================
    // Confirm Tests
    // ============================================================================

    #[test]
    fn test_confirm_requires_strong() {
        let mut t = tree();
        let h = t.propose(None, "x", HypothesisCategory::External).unwrap();
        t.record_evidence(&h.id, "q", json!({}), EvidenceStrength::Weak, "r")
            .unwrap();
        let err = t.confirm(&h.id).unwrap_err();
        assert!(matches!(err, HypothesisError::InvalidTransition { .. }));
    }

    #[test]
    fn test_confirm_freezes_and_is_idempotent() {
        let mut t = tree();
        let h = t.propose(None, "x", HypothesisCategory::External).unwrap();
        t.record_evidence(&h.id, "q", json!({}), EvidenceStrength::Strong, "r")
            .unwrap();
        let confirmed = t.confirm(&h.id).unwrap();
        assert_eq!(confirmed.status, HypothesisStatus::Confirmed);
        assert_eq!(confirmed.confidence, 70);

        let again = t.confirm(&h.id).unwrap();
        assert_eq!(again.status, HypothesisStatus::Confirmed);
        assert_eq!(again.confidence, 70);
    }

    #[test]
    fn test_second_confirm_is_ambiguous() {
        let mut t = tree();
        let a = t.propose(None, "a", HypothesisCategory::Infrastructure).unwrap();
        let b = t.propose(None, "b", HypothesisCategory::Infrastructure).unwrap();
        t.record_evidence(&a.id, "q", json!({}), EvidenceStrength::Strong, "r")
            .unwrap();
        t.record_evidence(&b.id, "q", json!({}), EvidenceStrength::Strong, "r")
            .unwrap();

        t.confirm(&a.id).unwrap();
        let err = t.confirm(&b.id).unwrap_err();
        assert!(matches!(err, HypothesisError::AmbiguousConfirmation { .. }));
        if let HypothesisError::AmbiguousConfirmation { confirmed_id, .. } = err {
            assert_eq!(confirmed_id, a.id);
        }
        // At most one confirmed node per tree
        assert_eq!(
            t.snapshot()
                .iter()
                .filter(|h| h.status == HypothesisStatus::Confirmed)
                .count(),
            1
        );
    }

    #[test]
    fn test_strong_candidates_surfaces_disambiguation_set() {
        let mut t = tree();
        let a = t.propose(None, "a", HypothesisCategory::Application).unwrap();
        let b = t.propose(None, "b", HypothesisCategory::Application).unwrap();
        t.record_evidence(&a.id, "q", json!({}), EvidenceStrength::Strong, "r")
            .unwrap();
        t.record_evidence(&b.id, "q", json!({}), EvidenceStrength::Strong, "r")
            .unwrap();

        let candidates = t.strong_candidates();
        assert_eq!(candidates.len(), 2);
    }

    // ============================================================================
    // Re-test Tests
    // ============================================================================

    #[test]
    fn test_retest_resets_ratchet() {
        let mut t = tree();
        let h = t.propose(None, "x", HypothesisCategory::Dependency).unwrap();
        t.record_evidence(&h.id, "q", json!({}), EvidenceStrength::Strong, "r")
            .unwrap();

        let h = t.retest(&h.id).unwrap();
        assert_eq!(h.evidence_strength, EvidenceStrength::None);
        assert_eq!(h.confidence, 0);
        assert_eq!(h.test_pass, 2);
        // Old ledger entries survive for audit
        assert_eq!(h.queries.len(), 1);

        let h = t
            .record_evidence(&h.id, "q2", json!({}), EvidenceStrength::Weak, "r2")
            .unwrap();
        assert_eq!(h.evidence_strength, EvidenceStrength::Weak);
        assert_eq!(h.confidence, 35);
    }

    #[test]
    fn test_retest_pruned_fails() {
        let mut t = tree();
        let h = t.propose(None, "x", HypothesisCategory::Dependency).unwrap();
        t.prune(&h.id, "gone").unwrap();
        let err = t.retest(&h.id).unwrap_err();
        assert!(matches!(err, HypothesisError::InvalidTransition { .. }));
    }

    #[test]
    fn test_retest_confirmed_is_noop() {
        let mut t = tree();
        let h = t.propose(None, "x", HypothesisCategory::Dependency).unwrap();
        t.record_evidence(&h.id, "q", json!({}), EvidenceStrength::Strong, "r")
            .unwrap();
        t.confirm(&h.id).unwrap();

        let h = t.retest(&h.id).unwrap();
        assert_eq!(h.status, HypothesisStatus::Confirmed);
        assert_eq!(h.test_pass, 1);
    }

    // ============================================================================
    // Snapshot / Restore Tests
    // ============================================================================

    #[test]
    fn test_snapshot_is_value_copy() {
        let mut t = tree();
        let h = t.propose(None, "x", HypothesisCategory::Application).unwrap();
        let snapshot = t.snapshot();

        t.record_evidence(&h.id, "q", json!({}), EvidenceStrength::Strong, "r")
            .unwrap();

        // Mutation after snapshot must not affect the snapshot
        assert_eq!(snapshot[0].status, HypothesisStatus::Pending);
        assert_eq!(snapshot[0].confidence, 0);
    }

    #[test]
    fn test_snapshot_restore_roundtrip() {
        let mut t = tree();
        let root = t.propose(None, "root", HypothesisCategory::Application).unwrap();
        t.record_evidence(&root.id, "q", json!({}), EvidenceStrength::Strong, "r")
            .unwrap();
        let kids = t.branch(&root.id, &["a", "b"]).unwrap();
        t.prune(&kids[1].id, "nope").unwrap();

        let restored = HypothesisTree::from_snapshot(t.snapshot(), t.max_depth());
        assert_eq!(restored.len(), t.len());
        assert_eq!(restored.roots().len(), 1);
        assert_eq!(restored.children(&root.id).len(), 2);
        assert_eq!(
            restored.get(&kids[1].id).unwrap().status,
            HypothesisStatus::Pruned
        );

        // Depth invariant holds across restore
        for node in restored.snapshot() {
            if let Some(parent_id) = &node.parent_id {
                let parent = restored.get(parent_id).unwrap();
                assert_eq!(node.depth, parent.depth + 1);
            } else {
                assert_eq!(node.depth, 0);
            }
        }
    }
}
