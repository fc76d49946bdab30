//! The classic SLR-vs-LR(1) grammar: SLR reports a shift/reduce conflict on
//! '=' in the state containing `R → L ·`; canonical LR(1) does not.

use lalrgen::{
    conflict, create_parser, diag::Diagnostics, lr1, table, Algorithm, Analysis, SemanticActions,
    TagActions, TreeValue,
};

const GRAMMAR: &str = r"
    %token id
    @import NAME as id
    @ignore {WHITESPACE}

    S : L '=' R | R ;
    L : '*' R | id ;
    R : L ;
";

#[test]
fn slr_reports_the_conflict_on_equals() {
    let parser = create_parser::<TreeValue>(
        GRAMMAR,
        SemanticActions::new(),
        TagActions::new(),
        Algorithm::Slr,
    )
    .unwrap();
    assert!(parser.diagnostics().has_warnings());
    assert!(parser
        .diagnostics()
        .iter()
        .any(|d| d.message.contains("shift/reduce") && d.message.contains("'='")));
}

#[test]
fn the_conflicted_state_holds_r_goes_to_l() {
    let grammar = lalrgen::read_grammar(GRAMMAR).unwrap().augmented().unwrap();
    let analysis = Analysis::analyze(&grammar).unwrap();
    let graph = lr1::build_lr0(&grammar, &analysis).unwrap();
    let mut built = table::build_table(&grammar, &analysis, &graph, Algorithm::Slr);

    // Before resolution the offending cell holds both actions, in the state
    // whose closure contains the satisfied item R → L ·.
    let mut conflicted = None;
    for (state, item_set) in graph.states.iter().enumerate() {
        let has_item = item_set.satisfied_items(&grammar).any(|item| {
            format!("{}", grammar.production(item.production())) == "R: L"
        });
        if has_item {
            if let Some(cell) = built.cell(state as u32, "'='") {
                if cell.len() > 1 {
                    conflicted = Some(state);
                }
            }
        }
    }
    assert!(conflicted.is_some());

    let mut diags = Diagnostics::new();
    let (sr, rr) = conflict::resolve(&mut built, &grammar, &mut diags);
    assert_eq!((sr, rr), (1, 0));
}

#[test]
fn lr1_has_no_conflict_on_the_same_grammar() {
    let parser = create_parser::<TreeValue>(
        GRAMMAR,
        SemanticActions::new(),
        TagActions::new(),
        Algorithm::Lr1,
    )
    .unwrap();
    assert!(!parser.diagnostics().has_warnings());
    // And it actually parses assignments.
    assert!(parser.parse("x = y").is_ok());
    assert!(parser.parse("* x = y").is_ok());
    assert!(parser.parse("x").is_ok());
}

#[test]
fn lalr_also_avoids_the_slr_conflict() {
    let parser = create_parser::<TreeValue>(
        GRAMMAR,
        SemanticActions::new(),
        TagActions::new(),
        Algorithm::Lalr,
    )
    .unwrap();
    assert!(!parser.diagnostics().has_warnings());
    assert!(parser.parse("* x = * y").is_ok());
}
