//! Conflict resolution by declared precedence and associativity.
//!
//! Every multi-action cell is collapsed with a pairwise left fold. Shift
//! wins unresolved shift/reduce conflicts and the earlier production wins
//! unresolved reduce/reduce conflicts, both with a warning, per the yacc
//! defaults. A `%nonassoc` tie leaves an explicit error cell.

use crate::diag::Diagnostics;
use crate::grammar::Grammar;
use crate::symbol::Associativity;
use crate::table::{Action, LRTable};

/// Collapses every cell to one action. Returns the counts of shift/reduce
/// and reduce/reduce conflicts that fell back to the default pick.
pub fn resolve(table: &mut LRTable, grammar: &Grammar, diags: &mut Diagnostics) -> (u32, u32) {
    let mut sr_defaults = 0u32;
    let mut rr_defaults = 0u32;
    for state in 0..table.state_count() {
        let row = &mut table.rows_mut()[state];
        for (symbol, cell) in row.iter_mut() {
            if cell.is_resolved() {
                continue;
            }
            let actions = cell.actions().to_vec();
            let mut resolved = actions[0].clone();
            for action in &actions[1..] {
                resolved = resolve_pair(
                    resolved,
                    action.clone(),
                    symbol,
                    state as u32,
                    grammar,
                    diags,
                    &mut sr_defaults,
                    &mut rr_defaults,
                );
            }
            cell.resolve_to(resolved);
        }
    }
    (sr_defaults, rr_defaults)
}

#[allow(clippy::too_many_arguments)]
fn resolve_pair(
    left: Action,
    right: Action,
    symbol: &str,
    state: u32,
    grammar: &Grammar,
    diags: &mut Diagnostics,
    sr_defaults: &mut u32,
    rr_defaults: &mut u32,
) -> Action {
    match (&left, &right) {
        (Action::Shift(target), Action::Reduce(production))
        | (Action::Reduce(production), Action::Shift(target)) => shift_reduce(
            *target,
            *production,
            symbol,
            state,
            grammar,
            diags,
            sr_defaults,
        ),
        (Action::Reduce(first), Action::Reduce(second)) => {
            reduce_reduce(*first, *second, symbol, state, grammar, diags, rr_defaults)
        }
        (Action::Shift(_), Action::Shift(_)) => {
            diags.error(
                format!(
                    "internal: shift/shift conflict on \"{}\" in state {}",
                    symbol, state
                ),
                None,
            );
            left
        }
        // An error cell produced by a nonassoc tie absorbs the rest.
        (Action::Error(_), _) => left,
        (_, Action::Error(_)) => right,
        (Action::Accept, _) | (_, Action::Accept) => {
            diags.error(
                format!(
                    "internal: accept conflicts with another action on \"{}\" in state {}",
                    symbol, state
                ),
                None,
            );
            Action::Accept
        }
    }
}

fn shift_reduce(
    target: u32,
    production: usize,
    symbol: &str,
    state: u32,
    grammar: &Grammar,
    diags: &mut Diagnostics,
    sr_defaults: &mut u32,
) -> Action {
    let rule_precedence = grammar
        .production(production)
        .precedence_tag()
        .and_then(|tag| grammar.precedence_of(tag));
    let lookahead_precedence = grammar.precedence_of(symbol);
    if let (Some(rule), Some(lookahead)) = (rule_precedence, lookahead_precedence) {
        if lookahead.level > rule.level {
            return Action::Shift(target);
        }
        if rule.level > lookahead.level {
            return Action::Reduce(production);
        }
        match lookahead.associativity {
            Associativity::Left => return Action::Reduce(production),
            Associativity::Right => return Action::Shift(target),
            Associativity::NonAssoc => return Action::Error(production),
            Associativity::Unspecified => {}
        }
    }
    *sr_defaults += 1;
    diags.warning(
        format!(
            "shift/reduce conflict on \"{}\" in state {} (shift {} vs reduce {}: {}), resolved as shift",
            symbol,
            state,
            target,
            production,
            grammar.production(production)
        ),
        grammar.anchor(production).cloned(),
    );
    Action::Shift(target)
}

fn reduce_reduce(
    first: usize,
    second: usize,
    symbol: &str,
    state: u32,
    grammar: &Grammar,
    diags: &mut Diagnostics,
    rr_defaults: &mut u32,
) -> Action {
    let earlier = first.min(second);
    let precedence_of = |production: usize| {
        grammar
            .production(production)
            .precedence_tag()
            .and_then(|tag| grammar.precedence_of(tag))
    };
    if let (Some(a), Some(b)) = (precedence_of(first), precedence_of(second)) {
        if a.level > b.level {
            return Action::Reduce(first);
        }
        if b.level > a.level {
            return Action::Reduce(second);
        }
        // Same level: keep the earlier-declared production.
        return Action::Reduce(earlier);
    }
    *rr_defaults += 1;
    diags.warning(
        format!(
            "reduce/reduce conflict on \"{}\" in state {} ({}: {} vs {}: {}), resolved in favour of the earlier rule",
            symbol,
            state,
            first,
            grammar.production(first),
            second,
            grammar.production(second)
        ),
        grammar.anchor(earlier).cloned(),
    );
    Action::Reduce(earlier)
}
