//! Mid-rule semantic actions: lifting to ε markers and firing order.

use std::cell::RefCell;
use std::rc::Rc;

use lalrgen::{
    create_parser, ActionSpec, Algorithm, Production, SemanticActions, TagActions, TreeValue,
};

const GRAMMAR: &str = r"
    @ignore {WHITESPACE}
    A : 'x' {tag} 'y' ;
";

#[test]
fn lifting_produces_marker_and_epsilon_production() {
    let trace: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(vec![]));
    let seen = Rc::clone(&trace);
    let actions = SemanticActions::new().with("tag", move |_: &Production, args: &[TreeValue]| {
        seen.borrow_mut().push(format!("tag:{}", args.len()));
        Ok(TreeValue::Empty)
    });
    let parser = create_parser(GRAMMAR, actions, TagActions::new(), Algorithm::Lalr).unwrap();

    // The augmented grammar holds S^ → A, the rewritten parent and M@1 → ε.
    let grammar = parser.grammar();
    assert_eq!(grammar.productions().len(), 3);
    let parent = grammar.production(1);
    assert_eq!(format!("{}", parent), "A: 'x' M@1 'y'");
    assert!(!parent.has_mid_actions());
    let marker = grammar.production(2);
    assert_eq!(format!("{}", marker), "M@1: <empty>");
    assert_eq!(marker.actions_at(0), &[ActionSpec::new("tag", 1)]);

    parser.parse("x y").unwrap();
    // Fired exactly once, with a two-value window: the slot below 'x' and
    // 'x' itself, before 'y' was shifted.
    assert_eq!(trace.borrow().as_slice(), &["tag:2".to_string()]);
}

#[test]
fn marker_actions_see_their_left_context() {
    let seen: Rc<RefCell<Option<String>>> = Rc::new(RefCell::new(None));
    let inner = Rc::clone(&seen);
    let actions = SemanticActions::new().with("tag", move |_: &Production, args: &[TreeValue]| {
        *inner.borrow_mut() = Some(format!("{}", args[1]));
        Ok(TreeValue::Empty)
    });
    let parser = create_parser(GRAMMAR, actions, TagActions::new(), Algorithm::Lr1).unwrap();
    parser.parse("x y").unwrap();
    assert_eq!(seen.borrow().as_deref(), Some("x"));
}

#[test]
fn actions_at_one_position_fire_in_insertion_order() {
    let trace: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(vec![]));
    let first = Rc::clone(&trace);
    let second = Rc::clone(&trace);
    let actions = SemanticActions::new()
        .with("one", move |_: &Production, _: &[TreeValue]| {
            first.borrow_mut().push("one");
            Ok(TreeValue::Empty)
        })
        .with("two", move |_: &Production, _: &[TreeValue]| {
            second.borrow_mut().push("two");
            Ok(TreeValue::Empty)
        });
    let source = "@ignore {WHITESPACE}\nA : 'x' {one} {two} 'y' ;";
    let parser = create_parser(source, actions, TagActions::new(), Algorithm::Lalr).unwrap();
    parser.parse("x y").unwrap();
    assert_eq!(trace.borrow().as_slice(), &["one", "two"]);
}

#[test]
fn failing_actions_stop_the_parse() {
    let actions = SemanticActions::new().with("tag", |_: &Production, _: &[TreeValue]| {
        Err(lalrgen::ActionError::new("no thanks"))
    });
    let parser = create_parser(GRAMMAR, actions, TagActions::new(), Algorithm::Lalr).unwrap();
    let error = parser.parse("x y").unwrap_err();
    assert!(format!("{}", error).contains("no thanks"));
}
