//! Grammar rewrites.
//!
//! `lift_mid_actions` reifies mid-rule semantic actions as ε-producing
//! marker nonterminals so the push-down driver only ever fires actions on
//! reduction. `eliminate_left_recursion` and `left_factor` are the
//! LL-oriented transforms; both recompute precedence tags afterwards and
//! warn when an explicit `%prec` override cannot be carried over.

use std::collections::BTreeMap;

use crate::analyzer::FIXPOINT_CAP;
use crate::diag::Diagnostics;
use crate::grammar::{ActionSpec, Grammar, GrammarError, Production, Vector};
use crate::symbol::Symbol;

/// Rewrites every production with a mid-rule action into an equivalent one
/// whose actions all sit at the end of a body.
///
/// For each action site at position `p < |body|` a fresh marker `M@k` is
/// inserted at the site and a production `M@k → ε` is appended whose
/// end-position action carries the original payload plus the number of
/// symbols left of the marker as its stack offset. Applying the rewrite to
/// an already lifted grammar is a no-op.
pub fn lift_mid_actions(grammar: &mut Grammar) -> Result<bool, GrammarError> {
    let count = grammar.productions().len();
    let mut pending: Vec<Production> = vec![];
    let mut changed = false;
    for index in 0..count {
        if !grammar.production(index).has_mid_actions() {
            continue;
        }
        changed = true;
        let production = grammar.production(index).clone();
        let len = production.len();
        let mut new_body: Vec<Symbol> = vec![];
        for position in 0..len {
            let specs = production.actions_at(position);
            if !specs.is_empty() {
                let marker = grammar.fresh_marker();
                let offset = new_body.len();
                let mut marker_production = Production::new(marker.clone(), Vector::empty());
                for spec in specs {
                    marker_production.add_action(0, ActionSpec::new(&spec.tag, offset));
                }
                pending.push(marker_production);
                new_body.push(marker);
            }
            new_body.push(production.body()[position].clone());
        }
        let new_len = new_body.len();
        let mut new_actions: BTreeMap<usize, Vec<ActionSpec>> = BTreeMap::new();
        let end_specs = production.actions_at(len);
        if !end_specs.is_empty() {
            new_actions.insert(
                new_len,
                end_specs
                    .iter()
                    .map(|spec| ActionSpec::new(&spec.tag, new_len))
                    .collect(),
            );
        }
        grammar
            .production_mut(index)
            .replace_body(Vector::new(new_body), new_actions);
    }
    for production in pending {
        grammar.push_production(production, None);
    }
    if changed {
        grammar.update()?;
    }
    Ok(changed)
}

fn warn_dropped_annotations(production: &Production, what: &str, diags: &mut Diagnostics) {
    if production.has_explicit_precedence() {
        diags.warning(
            format!(
                "precedence override \"%prec {}\" on \"{}\" dropped by {}",
                production.precedence_tag().unwrap_or(""),
                production,
                what,
            ),
            None,
        );
    }
    if !production.actions().is_empty() {
        diags.warning(
            format!("semantic actions on \"{}\" dropped by {}", production, what),
            None,
        );
    }
}

/// Eliminates direct left recursion. `A → A α | β` becomes `A → β A'` and
/// `A' → α A' | ε`. Precedence tags on the rewritten productions are
/// recomputed from their rightmost terminals.
pub fn eliminate_left_recursion(
    grammar: &mut Grammar,
    diags: &mut Diagnostics,
) -> Result<bool, GrammarError> {
    let heads: Vec<String> = grammar
        .productions()
        .iter()
        .map(|p| p.head().name().to_string())
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();
    let mut changed = false;
    for head_name in heads {
        let rule_indices = grammar.rules_for(&head_name).to_vec();
        let recursive: Vec<usize> = rule_indices
            .iter()
            .copied()
            .filter(|&i| {
                let production = grammar.production(i);
                production
                    .body()
                    .get(0)
                    .map(|s| s.name() == head_name)
                    .unwrap_or(false)
            })
            .collect();
        if recursive.is_empty() {
            continue;
        }
        let plain: Vec<usize> = rule_indices
            .iter()
            .copied()
            .filter(|i| !recursive.contains(i))
            .collect();
        if plain.is_empty() {
            diags.warning(
                format!(
                    "cannot eliminate left recursion for \"{}\": no non-recursive alternative",
                    head_name
                ),
                None,
            );
            continue;
        }
        changed = true;
        let head = grammar.intern(&head_name);
        let tail = grammar.fresh_non_terminal(&head_name);
        let rewrite = format!("left-recursion elimination of \"{}\"", head_name);
        let mut out: Vec<Production> = vec![];
        for production in grammar.productions() {
            if production.head().name() != head_name {
                out.push(production.clone());
                continue;
            }
            warn_dropped_annotations(production, &rewrite, diags);
            let mut body: Vec<Symbol> = if recursive.contains(&production.index()) {
                production.body().as_slice()[1..].to_vec()
            } else {
                production.body().as_slice().to_vec()
            };
            body.push(tail.clone());
            let new_head = if recursive.contains(&production.index()) {
                tail.clone()
            } else {
                head.clone()
            };
            out.push(Production::new(new_head, Vector::new(body)));
        }
        out.push(Production::new(tail.clone(), Vector::empty()));
        grammar.replace_productions(out);
        grammar.update()?;
    }
    Ok(changed)
}

/// Left-factors common rule prefixes. `A → γ α | γ β` becomes `A → γ A'`
/// with `A' → α | β`.
pub fn left_factor(grammar: &mut Grammar, diags: &mut Diagnostics) -> Result<bool, GrammarError> {
    let mut changed = false;
    for _ in 0..FIXPOINT_CAP {
        let mut step = None;
        let heads: Vec<String> = grammar
            .productions()
            .iter()
            .map(|p| p.head().name().to_string())
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();
        'search: for head_name in heads {
            let rule_indices = grammar.rules_for(&head_name).to_vec();
            let mut by_first: BTreeMap<String, Vec<usize>> = BTreeMap::new();
            for &index in &rule_indices {
                if let Some(first) = grammar.production(index).body().get(0) {
                    by_first
                        .entry(first.name().to_string())
                        .or_default()
                        .push(index);
                }
            }
            for (_, group) in by_first {
                if group.len() > 1 {
                    step = Some((head_name.clone(), group));
                    break 'search;
                }
            }
        }
        let (head_name, group) = match step {
            Some(step) => step,
            None => return Ok(changed),
        };
        changed = true;

        let mut prefix_len = 1;
        'extend: loop {
            let lead = grammar.production(group[0]).body();
            if lead.len() <= prefix_len {
                break;
            }
            let candidate = lead[prefix_len].name().to_string();
            for &index in &group[1..] {
                let body = grammar.production(index).body();
                if body.len() <= prefix_len || body[prefix_len].name() != candidate {
                    break 'extend;
                }
            }
            prefix_len += 1;
        }

        let head = grammar.intern(&head_name);
        let tail = grammar.fresh_non_terminal(&head_name);
        let rewrite = format!("left factoring of \"{}\"", head_name);
        let prefix: Vec<Symbol> = grammar.production(group[0]).body().as_slice()[..prefix_len].to_vec();
        let mut out: Vec<Production> = vec![];
        let mut suffixes: Vec<Production> = vec![];
        let mut emitted = false;
        for production in grammar.productions() {
            if !group.contains(&production.index()) {
                out.push(production.clone());
                continue;
            }
            warn_dropped_annotations(production, &rewrite, diags);
            if !emitted {
                let mut body = prefix.clone();
                body.push(tail.clone());
                out.push(Production::new(head.clone(), Vector::new(body)));
                emitted = true;
            }
            let suffix = production.body().as_slice()[prefix_len..].to_vec();
            suffixes.push(Production::new(tail.clone(), Vector::new(suffix)));
        }
        out.append(&mut suffixes);
        grammar.replace_productions(out);
        grammar.update()?;
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::read_grammar;
    use crate::analyzer::Analysis;

    #[test]
    fn mid_rule_actions_lift_to_markers() {
        let mut grammar = read_grammar("A : 'x' {tag} 'y' ;").unwrap();
        assert!(lift_mid_actions(&mut grammar).unwrap());
        assert_eq!(grammar.productions().len(), 2);

        let parent = grammar.production(0);
        assert_eq!(parent.len(), 3);
        assert_eq!(parent.body()[1].name(), "M@1");
        assert!(!parent.has_mid_actions());

        let marker = grammar.production(1);
        assert_eq!(marker.head().name(), "M@1");
        assert!(marker.is_empty());
        assert_eq!(marker.actions_at(0), &[ActionSpec::new("tag", 1)]);
    }

    #[test]
    fn lifting_is_idempotent() {
        let mut grammar = read_grammar("A : 'x' {tag} 'y' {fin} ;").unwrap();
        assert!(lift_mid_actions(&mut grammar).unwrap());
        let dump = format!("{}", grammar);
        assert!(!lift_mid_actions(&mut grammar).unwrap());
        assert_eq!(format!("{}", grammar), dump);
    }

    #[test]
    fn end_actions_move_to_the_rewritten_length() {
        let mut grammar = read_grammar("A : 'x' {tag} 'y' {fin} ;").unwrap();
        lift_mid_actions(&mut grammar).unwrap();
        let parent = grammar.production(0);
        assert_eq!(parent.actions_at(3), &[ActionSpec::new("fin", 3)]);
    }

    #[test]
    fn direct_left_recursion_is_eliminated() {
        let mut grammar = read_grammar("%token number\nE : E '+' T | T ;\nT : number ;").unwrap();
        let mut diags = Diagnostics::new();
        assert!(eliminate_left_recursion(&mut grammar, &mut diags).unwrap());

        let shapes: Vec<String> = grammar
            .productions()
            .iter()
            .map(|p| format!("{}", p))
            .collect();
        assert!(shapes.contains(&"E: T E'".to_string()));
        assert!(shapes.contains(&"E': '+' T E'".to_string()));
        assert!(shapes.contains(&"E': <empty>".to_string()));

        let analysis = Analysis::analyze(&grammar).unwrap();
        assert!(analysis.nullable("E'"));
        let first: Vec<String> = analysis.first("E'").iter().map(|s| s.to_string()).collect();
        assert_eq!(first, vec!["%empty", "'+'"]);
        assert_eq!(analysis.follow("E'"), analysis.follow("E"));
    }

    #[test]
    fn dropped_precedence_overrides_warn() {
        let mut grammar =
            read_grammar("%token number\n%left '+'\nE : E '+' T %prec '+' | T ;\nT : number ;")
                .unwrap();
        let mut diags = Diagnostics::new();
        eliminate_left_recursion(&mut grammar, &mut diags).unwrap();
        assert!(diags
            .iter()
            .any(|d| d.message.contains("precedence override")));
    }

    #[test]
    fn common_prefixes_are_factored() {
        let mut grammar =
            read_grammar("%token id\nS : id '(' ')' | id '(' S ')' | id ;").unwrap();
        let mut diags = Diagnostics::new();
        assert!(left_factor(&mut grammar, &mut diags).unwrap());
        let analysis = Analysis::analyze(&grammar).unwrap();
        assert!(analysis.is_ll1(&grammar));
    }
}
