mod common;
use common::*;

#[test]
fn side_effects_run_once_per_copy() {
    let mut interp = testing_interp();
    eval!("(define counter 0)
           (define (bump) (set! counter (+ counter 1)))", &mut interp);
    assert_eq!(eval!("(defmacro twice (x) (list 'begin x x))", &mut interp), Datum::from(true));
    eval!("(twice (bump))", &mut interp);
    assert_eq!(eval!("counter", &mut interp), Datum::from(2));
}

#[test]
fn macros_are_not_variables() {
    let mut interp = testing_interp();
    eval!("(defmacro twice (x) (list 'begin x x))", &mut interp);
    assert!(matches!(eval_str_in("twice", &mut interp), Err(LispError::UndefinedVariable(_))));
    // a variable of the same name does not stop expansion
    eval!("(define twice 5)", &mut interp);
    assert_eq!(eval!("(twice 7)", &mut interp), Datum::from(7));
}

#[test]
fn expansion_reaches_a_fixpoint() {
    let mut interp = testing_interp();
    eval!("(defmacro my-if (c a b) (list 'cond (list c a) (list 'else b)))", &mut interp);
    assert_eq!(eval!("(my-if (< 1 2) 'yes 'no)", &mut interp), Datum::symbol("yes"));
    assert_eq!(eval!("(my-if (< 2 1) 'yes 'no)", &mut interp), Datum::symbol("no"));
    assert_eq!(
        eval!("(list (my-if #t 1 2) (my-if #f (my-if #t 3 4) 5))", &mut interp),
        Datum::list(vec![Datum::from(1), Datum::from(5)]),
    );
}

#[test]
fn quoted_forms_are_left_alone() {
    let mut interp = testing_interp();
    eval!("(defmacro twice (x) (list 'begin x x))", &mut interp);
    assert_eq!(
        eval!("'(twice x)", &mut interp),
        Datum::list(vec![Datum::symbol("twice"), Datum::symbol("x")]),
    );
}

#[test]
fn expand_without_evaluating() {
    let mut interp = testing_interp();
    eval!("(defmacro twice (x) (list 'begin x x))", &mut interp);
    let form = interp.eval_str("'(f (twice (g)))").unwrap();
    let expanded = interp.expand(form).unwrap();
    assert_eq!(interp.display(expanded).to_string(), "(f (begin (g) (g)))");
}

#[test]
fn macro_bodies_are_expanded_when_defined() {
    let mut interp = testing_interp();
    eval!("(defmacro swap-call (f a b) (when #t (list f b a)))", &mut interp);
    assert_eq!(eval!("(swap-call - 1 10)", &mut interp), Datum::from(9));
}

#[test]
fn defmacro_only_at_top_level() {
    let mut interp = testing_interp();
    assert!(matches!(
        eval_str_in("(begin (defmacro m (x) x))", &mut interp),
        Err(LispError::InvalidForm(_))
    ));
    assert!(matches!(
        eval_str_in("(defmacro if (x) x)", &mut interp),
        Err(LispError::CannotRedefineSpecialForm(_))
    ));
    assert!(matches!(eval_str_in("(defmacro m)", &mut interp), Err(LispError::InvalidForm(_))));
}

#[test]
fn library_syntax() {
    let mut interp = testing_interp();
    assert_eq!(eval!("(let ((a 1) (b 2)) (+ a b))", &mut interp), Datum::from(3));
    assert_eq!(eval!("(let () 4)", &mut interp), Datum::from(4));
    assert_eq!(eval!("(cond (#f 1) ((= 1 1) 2) (else 3))", &mut interp), Datum::from(2));
    assert_eq!(eval!("(cond (#f 1) (else 3))", &mut interp), Datum::from(3));
    assert_eq!(eval!("(cond (#f 1))", &mut interp), Datum::from(false));
    assert_eq!(eval!("(and)", &mut interp), Datum::from(true));
    assert_eq!(eval!("(and 1 2 3)", &mut interp), Datum::from(3));
    assert_eq!(eval!("(and 1 #f 3)", &mut interp), Datum::from(false));
    assert_eq!(eval!("(or)", &mut interp), Datum::from(false));
    assert_eq!(eval!("(or #f 2 3)", &mut interp), Datum::from(2));
    assert_eq!(eval!("(or #f #f)", &mut interp), Datum::from(false));
    assert_eq!(eval!("(when (< 1 2) 'a 'b)", &mut interp), Datum::symbol("b"));
    assert_eq!(eval!("(unless (< 1 2) 'a)", &mut interp), Datum::from(false));
}

#[test]
fn or_evaluates_each_operand_once() {
    let mut interp = testing_interp();
    eval!("(define calls 0)
           (define (hit v) (set! calls (+ calls 1)) v)", &mut interp);
    assert_eq!(eval!("(or (hit #f) (hit 7) (hit 8))", &mut interp), Datum::from(7));
    assert_eq!(eval!("calls", &mut interp), Datum::from(2));
}

#[test]
fn quasiquote() {
    let mut interp = testing_interp();
    eval!("(define x 5) (define xs '(1 2))", &mut interp);
    assert_eq!(
        eval!("`(a ,x (b ,(+ x 1)) . ,xs)", &mut interp),
        Datum::dotted(
            vec![
                Datum::symbol("a"),
                Datum::from(5),
                Datum::list(vec![Datum::symbol("b"), Datum::from(6)]),
            ],
            Datum::list(vec![Datum::from(1), Datum::from(2)]),
        ),
    );
    assert_eq!(
        eval!("`#(1 ,x)", &mut interp),
        Datum::Vector(vec![Datum::from(1), Datum::from(5)]),
    );
}
