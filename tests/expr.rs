//! End-to-end expression parsing under the different table algorithms.

use lalrgen::{
    create_parser, Algorithm, ParserEngine, Production, SemanticActions, TagActions, TreeValue,
};

const GRAMMAR: &str = r"
    %token number
    @import NUMBER as number
    @ignore {WHITESPACE}

    E : E '+' T {add} | T {pass} ;
    T : T '*' F {mul} | F {pass} ;
    F : number {num} | '(' E ')' {paren} ;
";

fn node(head: &str, children: Vec<TreeValue>) -> TreeValue {
    TreeValue::Node {
        head: head.to_string(),
        children,
    }
}

fn tree_actions() -> SemanticActions<TreeValue> {
    SemanticActions::new()
        .with("add", |_: &Production, args: &[TreeValue]| {
            Ok(node("+", vec![args[1].clone(), args[3].clone()]))
        })
        .with("mul", |_: &Production, args: &[TreeValue]| {
            Ok(node("*", vec![args[1].clone(), args[3].clone()]))
        })
        .with("num", |_: &Production, args: &[TreeValue]| {
            Ok(args[1].clone())
        })
        .with("pass", |_: &Production, args: &[TreeValue]| {
            Ok(args[1].clone())
        })
        .with("paren", |_: &Production, args: &[TreeValue]| {
            Ok(args[2].clone())
        })
}

fn engine(algorithm: Algorithm) -> ParserEngine<TreeValue> {
    create_parser(GRAMMAR, tree_actions(), TagActions::new(), algorithm).unwrap()
}

#[test]
fn lr1_parses_with_the_right_shape() {
    let parser = engine(Algorithm::Lr1);
    let tree = parser.parse("1+2*3").unwrap();
    assert_eq!(format!("{}", tree), "(+ 1 (* 2 3))");
}

#[test]
fn lalr_parses_and_matches_the_lr0_state_count() {
    let parser = engine(Algorithm::Lalr);
    let tree = parser.parse("1*(2+3)").unwrap();
    assert_eq!(format!("{}", tree), "(* 1 (+ 2 3))");
    assert!(!parser.diagnostics().has_warnings());

    let lr0 = engine(Algorithm::Lr0);
    let lr1 = engine(Algorithm::Lr1);
    assert_eq!(parser.state_count(), lr0.state_count());
    assert!(parser.state_count() <= lr1.state_count());
}

#[test]
fn slr_handles_the_unambiguous_grammar_too() {
    let parser = engine(Algorithm::Slr);
    assert!(!parser.diagnostics().has_warnings());
    let tree = parser.parse("(1+2)*3").unwrap();
    assert_eq!(format!("{}", tree), "(* (+ 1 2) 3)");
}

#[test]
fn precedence_declarations_shape_the_ambiguous_grammar() {
    let source = r"
        %token number
        %left '+'
        %left '*'
        @import NUMBER as number
        @ignore {WHITESPACE}

        E : E '+' E {add} | E '*' E {mul} | number {num} ;
    ";
    let actions = SemanticActions::new()
        .with("add", |_: &Production, args: &[TreeValue]| {
            Ok(node("+", vec![args[1].clone(), args[3].clone()]))
        })
        .with("mul", |_: &Production, args: &[TreeValue]| {
            Ok(node("*", vec![args[1].clone(), args[3].clone()]))
        })
        .with("num", |_: &Production, args: &[TreeValue]| {
            Ok(args[1].clone())
        });
    let parser = create_parser(source, actions, TagActions::new(), Algorithm::Lalr).unwrap();
    assert!(!parser.diagnostics().has_warnings());
    let tree = parser.parse("1+2*3+4").unwrap();
    assert_eq!(format!("{}", tree), "(+ (+ 1 (* 2 3)) 4)");
}

#[test]
fn syntax_errors_carry_line_and_column() {
    let parser = engine(Algorithm::Lalr);
    let error = parser.parse("1+\n*3").unwrap_err();
    let message = format!("{}", error);
    assert!(message.contains("Syntax Error"), "{}", message);
    assert!(message.contains("2:1"), "{}", message);
    assert!(message.contains("expected"), "{}", message);
}

#[test]
fn unmatched_characters_report_as_lexical_errors() {
    let parser = engine(Algorithm::Lr1);
    let error = parser.parse("1 ? 2").unwrap_err();
    let message = format!("{}", error);
    assert!(message.contains("Lexical Error"), "{}", message);
    assert!(message.contains("?"), "{}", message);
}

#[test]
fn rebuilding_yields_an_identical_table() {
    let first = engine(Algorithm::Lalr);
    let second = engine(Algorithm::Lalr);
    assert_eq!(
        format!("{}", first.table()),
        format!("{}", second.table())
    );
    assert_eq!(
        format!("{}", first.grammar()),
        format!("{}", second.grammar())
    );
}
