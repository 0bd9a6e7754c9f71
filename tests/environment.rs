mod common;
use common::*;

#[test]
fn define_and_lookup() {
    let mut interp = testing_interp();
    eval!("(define x 10)", &mut interp);
    assert_eq!(eval!("x", &mut interp), Datum::from(10));
    eval!("(define x 11)", &mut interp);
    assert_eq!(eval!("x", &mut interp), Datum::from(11));
    assert!(matches!(
        eval_str_in("never-defined", &mut interp),
        Err(LispError::UndefinedVariable(name)) if name == "never-defined"
    ));
}

#[test]
fn inner_define_shadows() {
    let mut interp = testing_interp();
    assert_eq!(eval!("(define x 1) (define (f) (define x 2) x) (f)", &mut interp), Datum::from(2));
    assert_eq!(eval!("x", &mut interp), Datum::from(1));
}

#[test]
fn set_mutates_nearest_binding() {
    let mut interp = testing_interp();
    eval!("(define x 1) (define (bump!) (set! x (+ x 1)))", &mut interp);
    eval!("(bump!) (bump!)", &mut interp);
    assert_eq!(eval!("x", &mut interp), Datum::from(3));

    eval!("(define (shadowed) (define x 100) (set! x 5) x)", &mut interp);
    assert_eq!(eval!("(shadowed)", &mut interp), Datum::from(5));
    assert_eq!(eval!("x", &mut interp), Datum::from(3));

    assert!(matches!(eval_str_in("(set! nowhere 1)", &mut interp), Err(LispError::UndefinedVariable(_))));
}

#[test]
fn closures_capture_their_frame() {
    let mut interp = testing_interp();
    eval!("(define (make-counter)
               (define n 0)
               (lambda () (set! n (+ n 1)) n))
           (define a (make-counter))
           (define b (make-counter))", &mut interp);
    eval!("(a) (a)", &mut interp);
    assert_eq!(eval!("(a)", &mut interp), Datum::from(3));
    assert_eq!(eval!("(b)", &mut interp), Datum::from(1));
}

#[test]
fn special_form_names_are_reserved() {
    let mut interp = testing_interp();
    for name in ["quote", "if", "begin", "define", "set!", "lambda", "defmacro"] {
        let result = eval_str_in(&format!("(define {} 1)", name), &mut interp);
        assert!(matches!(result, Err(LispError::CannotRedefineSpecialForm(n)) if n == name));
    }
    assert!(matches!(
        eval_str_in("((lambda (if) if) 1)", &mut interp),
        Err(LispError::CannotRedefineSpecialForm(_))
    ));
}

#[test]
fn fixed_arity() {
    let mut interp = testing_interp();
    eval!("(define (f a b) (list a b))", &mut interp);
    assert_eq!(eval!("(f 1 2)", &mut interp), Datum::list(vec![Datum::from(1), Datum::from(2)]));
    assert!(matches!(eval_str_in("(f 1)", &mut interp), Err(LispError::IncorrectArguments(2, 1))));
    assert!(matches!(eval_str_in("(f 1 2 3)", &mut interp), Err(LispError::IncorrectArguments(2, 3))));
    assert!(matches!(eval_str_in("((lambda () 1) 1)", &mut interp), Err(LispError::IncorrectArguments(0, 1))));
}

#[test]
fn rest_parameters() {
    let mut interp = testing_interp();
    eval!("(define (g a b . rest) rest)", &mut interp);
    assert_eq!(eval!("(g 1 2)", &mut interp), Datum::Null);
    assert_eq!(eval!("(g 1 2 3 4)", &mut interp), Datum::list(vec![Datum::from(3), Datum::from(4)]));
    assert!(matches!(eval_str_in("(g 1)", &mut interp), Err(LispError::TooFewArguments(2, 1))));

    assert_eq!(eval!("((lambda args args))", &mut interp), Datum::Null);
    assert_eq!(
        eval!("((lambda args args) 1 2)", &mut interp),
        Datum::list(vec![Datum::from(1), Datum::from(2)]),
    );
    assert_eq!(eval!("((lambda (a . b) b) 1 2)", &mut interp), Datum::list(vec![Datum::from(2)]));
}

#[test]
fn malformed_forms() {
    let mut interp = testing_interp();
    for source in ["()", "(if 1 2)", "(quote)", "(quote 1 2)", "(begin)", "(lambda (1) 1)", "(lambda (x))", "(define)"] {
        assert!(
            matches!(eval_str_in(source, &mut interp), Err(LispError::InvalidForm(_))),
            "{}",
            source,
        );
    }
    assert!(matches!(eval_str_in("#(1 2)", &mut interp), Err(LispError::InvalidForm(_))));
    assert!(matches!(eval_str_in("(1 2)", &mut interp), Err(LispError::NotCallable(_))));
}

#[test]
fn errors_do_not_poison_the_interpreter() {
    let mut interp = testing_interp();
    eval!("(define x 1)", &mut interp);
    assert!(eval_str_in("(car x)", &mut interp).is_err());
    assert_eq!(eval!("(+ x 1)", &mut interp), Datum::from(2));
}

#[test]
fn define_returns_the_undefined_marker() {
    assert_eq!(eval!("(define x 1)"), Datum::symbol("undefined"));
    assert_eq!(eval!("(if #f 1 2)"), Datum::from(2));
    assert_eq!(eval!("(if '() 1 2)"), Datum::from(1));
    assert_eq!(eval!("(if 0 1 2)"), Datum::from(1));
}
