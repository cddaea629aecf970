//! Percentage-base resolution.
//!
//! A percentage line is worth `unit_rate %` of the combined value of the
//! nodes it selects. Selections are plain ids resolved against a fresh
//! [`TreeIndex`] on every call, so they may point at categories,
//! sub-categories, posts or sub-posts anywhere in the tree, or at nothing.
//!
//! Counting rules:
//! - every node contributes at most once per resolution (`visited`);
//! - a node whose ancestor is also selected contributes nothing on its own,
//!   its value is attributed to the ancestor;
//! - a percentage line met while resolving another one contributes its own
//!   value, settled once per snapshot;
//! - percentage lines whose selections reach each other (a line selecting
//!   its own category included) contribute zero to one another.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Instant;

use crate::currency::convert_from;
use crate::error::CostlineError;
use crate::settings::BudgetSettings;
use crate::tree::{Category, CostLine, Resolved, TreeIndex};
use crate::types::{with_metadata, ComputationOutput, Diagnostic, Diagnostics, Money, Percent};
use crate::valuation::fingerprint::fingerprint;
use crate::valuation::line::leaf_amount;
use crate::valuation::social::{charge_amount, charge_fraction};
use crate::valuation::ValuationContext;
use crate::CostlineResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One node's share of a resolved base, for audit display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakdownEntry {
    pub id: String,
    pub name: String,
    pub amount: Money,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<BreakdownEntry>,
}

/// Deduplicated sum of a selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedBase {
    pub total: Money,
    pub breakdown: Vec<BreakdownEntry>,
    #[serde(default)]
    pub diagnostics: Diagnostics,
}

/// Per-resolution bookkeeping.
struct Walk<'s, 'q> {
    selected: HashSet<&'q str>,
    visited: HashSet<&'s str>,
    include_social_charges: bool,
    /// Component of the percentage line whose base is being resolved.
    within: Option<usize>,
}

impl Walk<'_, '_> {
    fn covered_by_ancestor(&self, chain: &[&str]) -> bool {
        chain.iter().any(|id| self.selected.contains(*id))
    }
}

/// A percentage line's settled value and what resolving it reported.
#[derive(Debug, Clone)]
struct Settled {
    value: Money,
    diagnostics: Diagnostics,
}

// ---------------------------------------------------------------------------
// Reference graph
// ---------------------------------------------------------------------------

/// Percentage lines of a snapshot in document order, with the percentage
/// lines each one reaches through its selection.
struct ReferenceGraph<'a> {
    lines: Vec<&'a CostLine>,
    edges: Vec<Vec<usize>>,
}

impl<'a> ReferenceGraph<'a> {
    fn build(categories: &'a [Category], index: &TreeIndex<'a>) -> Self {
        let mut lines = Vec::new();
        for category in categories {
            collect_percentage_lines(&category.children, &mut lines);
        }
        let mut position: HashMap<&str, usize> = HashMap::new();
        for (i, line) in lines.iter().enumerate() {
            position.entry(line.id.as_str()).or_insert(i);
        }

        let edges = lines
            .iter()
            .map(|line| {
                let mut reached = Vec::new();
                for id in &line.selected_references {
                    match index.resolve(id) {
                        Some(Resolved::Category(category)) => {
                            collect_percentage_lines(&category.children, &mut reached)
                        }
                        Some(Resolved::Node(node)) => {
                            collect_percentage_lines(std::slice::from_ref(node.line), &mut reached)
                        }
                        None => {}
                    }
                }
                let mut targets: Vec<usize> = reached
                    .iter()
                    .filter_map(|l| position.get(l.id.as_str()).copied())
                    .collect();
                targets.sort_unstable();
                targets.dedup();
                targets
            })
            .collect();

        Self { lines, edges }
    }

    /// Strongly connected components, each listed after every component it
    /// reaches (Tarjan).
    fn components(&self) -> Vec<Vec<usize>> {
        let mut t = Tarjan {
            edges: &self.edges,
            order: vec![None; self.lines.len()],
            low: vec![0; self.lines.len()],
            on_stack: vec![false; self.lines.len()],
            stack: Vec::new(),
            next: 0,
            components: Vec::new(),
        };
        for v in 0..self.lines.len() {
            if t.order[v].is_none() {
                t.visit(v);
            }
        }
        t.components
    }
}

fn collect_percentage_lines<'a>(lines: &'a [CostLine], out: &mut Vec<&'a CostLine>) {
    for line in lines {
        if line.is_percentage() {
            out.push(line);
        } else {
            collect_percentage_lines(&line.children, out);
        }
    }
}

struct Tarjan<'g> {
    edges: &'g [Vec<usize>],
    order: Vec<Option<usize>>,
    low: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    next: usize,
    components: Vec<Vec<usize>>,
}

impl Tarjan<'_> {
    fn visit(&mut self, v: usize) {
        self.order[v] = Some(self.next);
        self.low[v] = self.next;
        self.next += 1;
        self.stack.push(v);
        self.on_stack[v] = true;

        let edges = self.edges;
        for &w in &edges[v] {
            match self.order[w] {
                None => {
                    self.visit(w);
                    self.low[v] = self.low[v].min(self.low[w]);
                }
                Some(seen) if self.on_stack[w] => self.low[v] = self.low[v].min(seen),
                Some(_) => {}
            }
        }

        if self.order[v] == Some(self.low[v]) {
            let mut component = Vec::new();
            while let Some(w) = self.stack.pop() {
                self.on_stack[w] = false;
                component.push(w);
                if w == v {
                    break;
                }
            }
            component.sort_unstable();
            self.components.push(component);
        }
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Values lines against one snapshot, resolving percentage bases on demand.
///
/// Every percentage line of the snapshot is settled once, when the resolver
/// is built, in dependency order. Lines that reach each other through their
/// selections form a cycle and contribute zero to one another, so a line's
/// value does not depend on which line was asked for first.
///
/// Build once per computation and reuse; the index is not refreshed.
pub struct Resolver<'a> {
    index: TreeIndex<'a>,
    ctx: ValuationContext<'a>,
    component: HashMap<&'a str, usize>,
    settled: HashMap<&'a str, Settled>,
}

impl<'a> Resolver<'a> {
    pub fn new(categories: &'a [Category], ctx: ValuationContext<'a>) -> Self {
        let index = TreeIndex::build(categories);
        let graph = ReferenceGraph::build(categories, &index);
        let components = graph.components();

        let mut resolver = Self {
            index,
            ctx,
            component: HashMap::new(),
            settled: HashMap::new(),
        };
        for (c, members) in components.iter().enumerate() {
            for &m in members {
                resolver
                    .component
                    .entry(graph.lines[m].id.as_str())
                    .or_insert(c);
            }
        }
        for (c, members) in components.iter().enumerate() {
            let values: Vec<(&'a str, Settled)> = members
                .iter()
                .map(|&m| {
                    let line = graph.lines[m];
                    let mut diagnostics = Diagnostics::new();
                    let value = resolver.own_value(line, Some(c), &mut diagnostics);
                    (line.id.as_str(), Settled { value, diagnostics })
                })
                .collect();
            for (id, settled) in values {
                resolver.settled.entry(id).or_insert(settled);
            }
        }
        tracing::trace!(lines = graph.lines.len(), "percentage lines settled");
        resolver
    }

    pub fn context(&self) -> &ValuationContext<'a> {
        &self.ctx
    }

    /// Resolve a selection into its deduplicated total and breakdown.
    pub fn resolve(&self, selected: &[String], include_social_charges: bool) -> ResolvedBase {
        let mut diagnostics = Diagnostics::new();
        let (total, breakdown) =
            self.resolve_selection(selected, include_social_charges, None, &mut diagnostics);
        ResolvedBase {
            total,
            breakdown,
            diagnostics,
        }
    }

    /// Value of a single line in the target currency. Percentage lines are
    /// resolved against the snapshot; children are ignored.
    pub fn line_value(&self, line: &CostLine, diagnostics: &mut Diagnostics) -> Money {
        self.leaf_value(line, None, diagnostics)
    }

    /// Rollup value of a line and its descendants, optionally with charges.
    pub fn subtree_value(
        &self,
        line: &CostLine,
        include_social_charges: bool,
        diagnostics: &mut Diagnostics,
    ) -> Money {
        self.subtree_inner(line, include_social_charges, None, diagnostics)
    }

    /// Social charges of a line already valued at `value`, in the target
    /// currency.
    pub fn line_charges(
        &self,
        line: &CostLine,
        value: Money,
        diagnostics: &mut Diagnostics,
    ) -> Money {
        let Some(fraction) = charge_fraction(line, self.ctx.charge_rates) else {
            return Decimal::ZERO;
        };
        if line.is_percentage() {
            return value * fraction;
        }
        let charge = charge_amount(line, self.ctx.charge_rates, self.ctx.use_alternate_rate);
        let source = line
            .currency
            .as_deref()
            .filter(|code| *code != self.ctx.target_currency);
        convert_from(
            charge,
            source,
            self.ctx.target_currency,
            self.ctx.rates,
            diagnostics,
        )
    }

    fn subtree_inner(
        &self,
        line: &CostLine,
        include_social_charges: bool,
        within: Option<usize>,
        diagnostics: &mut Diagnostics,
    ) -> Money {
        if line.has_children() && !line.is_percentage() {
            return line
                .children
                .iter()
                .map(|child| self.subtree_inner(child, include_social_charges, within, diagnostics))
                .sum();
        }
        self.leaf_with_charges(line, include_social_charges, within, diagnostics)
    }

    fn leaf_with_charges(
        &self,
        line: &CostLine,
        include_social_charges: bool,
        within: Option<usize>,
        diagnostics: &mut Diagnostics,
    ) -> Money {
        let value = self.leaf_value(line, within, diagnostics);
        if include_social_charges {
            value + self.line_charges(line, value, diagnostics)
        } else {
            value
        }
    }

    fn leaf_value(
        &self,
        line: &CostLine,
        within: Option<usize>,
        diagnostics: &mut Diagnostics,
    ) -> Money {
        if line.is_percentage() {
            return self.percentage_value(line, within, diagnostics);
        }
        leaf_amount(
            line,
            self.ctx.target_currency,
            self.ctx.rates,
            self.ctx.use_alternate_rate,
            diagnostics,
        )
    }

    /// A percentage line met while valuing: zero inside its own cycle,
    /// otherwise its settled value.
    fn percentage_value(
        &self,
        line: &CostLine,
        within: Option<usize>,
        diagnostics: &mut Diagnostics,
    ) -> Money {
        let component = self.component.get(line.id.as_str()).copied();
        if component.is_some() && component == within {
            tracing::trace!(line = %line.id, "percentage line inside its own cycle");
            diagnostics.push(Diagnostic::CyclicReference {
                id: line.id.clone(),
            });
            return Decimal::ZERO;
        }
        if let Some(settled) = self.settled.get(line.id.as_str()) {
            diagnostics.extend(settled.diagnostics.clone());
            return settled.value;
        }
        self.own_value(line, component, diagnostics)
    }

    /// `unit_rate % × base` with the line's own selection resolved.
    fn own_value(
        &self,
        line: &CostLine,
        within: Option<usize>,
        diagnostics: &mut Diagnostics,
    ) -> Money {
        let (base, _) = self.resolve_selection(
            &line.selected_references,
            line.include_social_charges_in_base,
            within,
            diagnostics,
        );
        line.unit_rate / dec!(100) * base
    }

    fn resolve_selection(
        &self,
        selected: &[String],
        include_social_charges: bool,
        within: Option<usize>,
        diagnostics: &mut Diagnostics,
    ) -> (Money, Vec<BreakdownEntry>) {
        let mut walk = Walk {
            selected: selected.iter().map(String::as_str).collect(),
            visited: HashSet::new(),
            include_social_charges,
            within,
        };
        let mut total = Decimal::ZERO;
        let mut breakdown = Vec::new();

        for id in selected {
            let entry = match self.index.resolve(id) {
                Some(Resolved::Category(category)) => {
                    if !walk.visited.insert(category.id.as_str()) {
                        continue;
                    }
                    let mut children = Vec::new();
                    let mut amount = Decimal::ZERO;
                    for child in &category.children {
                        let mut chain = Vec::new();
                        if let Some(e) = self.sum_node(child, &mut chain, &mut walk, diagnostics) {
                            amount += e.amount;
                            children.push(e);
                        }
                    }
                    Some(BreakdownEntry {
                        id: category.id.clone(),
                        name: category.name.clone(),
                        amount,
                        children,
                    })
                }
                Some(Resolved::Node(node)) => {
                    let mut chain = node.ancestors.clone();
                    self.sum_node(node.line, &mut chain, &mut walk, diagnostics)
                }
                None => {
                    diagnostics.push(Diagnostic::UnresolvedReference { id: id.clone() });
                    None
                }
            };

            if let Some(entry) = entry {
                tracing::trace!(id = %entry.id, amount = %entry.amount, "selection entry resolved");
                total += entry.amount;
                breakdown.push(entry);
            }
        }

        (total, breakdown)
    }

    /// Contribution of `node` reached through `chain`, or `None` when it was
    /// already counted or an ancestor in the chain is selected.
    fn sum_node<'s>(
        &'s self,
        node: &'s CostLine,
        chain: &mut Vec<&'s str>,
        walk: &mut Walk<'s, '_>,
        diagnostics: &mut Diagnostics,
    ) -> Option<BreakdownEntry> {
        if walk.visited.contains(node.id.as_str()) || walk.covered_by_ancestor(chain) {
            return None;
        }
        walk.visited.insert(node.id.as_str());

        if walk.selected.contains(node.id.as_str()) || !node.has_children() || node.is_percentage()
        {
            return Some(self.matched_entry(node, walk, diagnostics));
        }

        chain.push(node.id.as_str());
        let mut children = Vec::new();
        let mut amount = Decimal::ZERO;
        for child in &node.children {
            if let Some(e) = self.sum_node(child, chain, walk, diagnostics) {
                amount += e.amount;
                children.push(e);
            }
        }
        chain.pop();

        Some(BreakdownEntry {
            id: node.id.clone(),
            name: node.name.clone(),
            amount,
            children,
        })
    }

    /// Value a matched node whole. Containers roll their children up without
    /// any further selection checks.
    fn matched_entry<'s>(
        &'s self,
        node: &'s CostLine,
        walk: &mut Walk<'s, '_>,
        diagnostics: &mut Diagnostics,
    ) -> BreakdownEntry {
        if !node.has_children() || node.is_percentage() {
            let amount = self.leaf_with_charges(
                node,
                walk.include_social_charges,
                walk.within,
                diagnostics,
            );
            return BreakdownEntry {
                id: node.id.clone(),
                name: node.name.clone(),
                amount,
                children: Vec::new(),
            };
        }

        let mut children = Vec::new();
        let mut amount = Decimal::ZERO;
        for child in &node.children {
            if !walk.visited.insert(child.id.as_str()) {
                continue;
            }
            let e = self.matched_entry(child, walk, diagnostics);
            amount += e.amount;
            children.push(e);
        }
        BreakdownEntry {
            id: node.id.clone(),
            name: node.name.clone(),
            amount,
            children,
        }
    }
}

// ---------------------------------------------------------------------------
// Function 1: resolve_base
// ---------------------------------------------------------------------------

/// Deduplicated monetary sum of `selected_ids` over `categories`.
pub fn resolve_base(
    selected_ids: &[String],
    categories: &[Category],
    ctx: &ValuationContext<'_>,
    include_social_charges: bool,
) -> ResolvedBase {
    if selected_ids.is_empty() {
        return ResolvedBase::default();
    }
    Resolver::new(categories, *ctx).resolve(selected_ids, include_social_charges)
}

/// A percentage line's value with the base it was computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PercentageValue {
    pub amount: Money,
    pub base: ResolvedBase,
}

/// `unit_rate % × base` for a percentage line, resolving its own
/// `selected_references`. Non-percentage lines are worth zero here.
pub fn value_percentage_line(
    line: &CostLine,
    categories: &[Category],
    ctx: &ValuationContext<'_>,
) -> PercentageValue {
    if !line.is_percentage() {
        return PercentageValue {
            amount: Decimal::ZERO,
            base: ResolvedBase::default(),
        };
    }
    let resolver = Resolver::new(categories, *ctx);
    let mut diagnostics = Diagnostics::new();
    // a copy of a snapshot line keeps that line's cycle
    let within = resolver.component.get(line.id.as_str()).copied();
    let (total, breakdown) = resolver.resolve_selection(
        &line.selected_references,
        line.include_social_charges_in_base,
        within,
        &mut diagnostics,
    );
    PercentageValue {
        amount: line.unit_rate / dec!(100) * total,
        base: ResolvedBase {
            total,
            breakdown,
            diagnostics,
        },
    }
}

// ---------------------------------------------------------------------------
// Function 2: resolve_percentage_base (envelope)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveBaseInput {
    pub selected_references: Vec<String>,
    pub categories: Vec<Category>,
    #[serde(default)]
    pub include_social_charges: bool,
    /// When set, the output also carries `percent % × total`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent: Option<Percent>,
    #[serde(default)]
    pub settings: BudgetSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveBaseOutput {
    pub currency: String,
    pub total: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_amount: Option<Money>,
    pub breakdown: Vec<BreakdownEntry>,
    /// Structural cache key of the selection.
    pub fingerprint: String,
}

pub fn resolve_percentage_base(
    input: &ResolveBaseInput,
) -> CostlineResult<ComputationOutput<ResolveBaseOutput>> {
    let start = Instant::now();
    input.settings.validate()?;
    if let Some(p) = input.percent {
        if p < Decimal::ZERO {
            return Err(CostlineError::InvalidInput {
                field: "percent".into(),
                reason: "Percentage cannot be negative".into(),
            });
        }
    }

    let mut warnings: Vec<String> = Vec::new();
    let ctx = input.settings.context();
    let resolved = resolve_base(
        &input.selected_references,
        &input.categories,
        &ctx,
        input.include_social_charges,
    );

    if input.selected_references.is_empty() {
        warnings.push("Empty selection: percentage base is zero".to_string());
    }

    let output = ResolveBaseOutput {
        currency: ctx.target_currency.to_string(),
        total: resolved.total,
        line_amount: input.percent.map(|p| p / dec!(100) * resolved.total),
        breakdown: resolved.breakdown,
        fingerprint: fingerprint(&input.selected_references, &input.categories),
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Percentage base: deduplicated sum of selected nodes, ancestors take precedence",
        &serde_json::json!({
            "selected_references": input.selected_references,
            "include_social_charges": input.include_social_charges,
            "target_currency": ctx.target_currency,
        }),
        warnings,
        resolved.diagnostics,
        elapsed,
        output,
    ))
}
