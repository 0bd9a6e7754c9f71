mod common;
use common::*;
use compact_scheme::{Builtin, Step};

fn ints(items: &[i64]) -> Datum {
    Datum::list(items.iter().map(|&i| Datum::from(i)).collect())
}

#[test]
fn arithmetic() {
    assert_eq!(eval!("(+ 1 2)"), Datum::from(3));
    assert_eq!(eval!("(- 1 2)"), Datum::from(-1));
    assert_eq!(eval!("(* 6 7)"), Datum::from(42));
    assert_eq!(eval!("(+ 1 2.5)"), Datum::from(3.5));
    assert_eq!(eval!("(/ 1 2)"), Datum::from(0.5));
    assert_eq!(eval!("(/ 4 2)"), Datum::from(2.0));
    assert_eq!(eval!("(quotient 7 2)"), Datum::from(3));
    assert_eq!(eval!("(remainder -7 2)"), Datum::from(-1));
    assert_eq!(eval!("(* 9223372036854775807 2)"), Datum::from(18446744073709551614.0));
    assert!(matches!(eval_str("(/ 1 0)"), Err(LispError::DivisionByZero)));
    assert!(matches!(eval_str("(quotient 1 0)"), Err(LispError::DivisionByZero)));
    assert!(matches!(eval_str("(quotient 1.5 1)"), Err(LispError::InvalidDataType("integer", "float"))));
    assert!(matches!(eval_str("(+ 1 'a)"), Err(LispError::InvalidDataType("number", "symbol"))));
}

#[test]
fn comparison_and_conversion() {
    assert_eq!(eval!("(< 1 2)"), Datum::from(true));
    assert_eq!(eval!("(< 2 1.5)"), Datum::from(false));
    assert_eq!(eval!("(= 1 1.0)"), Datum::from(true));
    assert_eq!(eval!("(>= 3 3)"), Datum::from(true));
    assert_eq!(eval!("(exact->inexact 3)"), Datum::from(3.0));
    assert_eq!(eval!("(inexact->exact -3.7)"), Datum::from(-3));
    assert_eq!(eval!("(abs -4)"), Datum::from(4));
    assert_eq!(eval!("(zero? 0)"), Datum::from(true));
}

#[test]
fn predicates_and_type() {
    let mut interp = testing_interp();
    let cases = [
        ("(integer? 1)", true),
        ("(integer? 1.0)", false),
        ("(float? 1.0)", true),
        ("(symbol? 'a)", true),
        ("(pair? '(1))", true),
        ("(pair? '())", false),
        ("(null? '())", true),
        ("(string? \"s\")", true),
        ("(boolean? #f)", true),
        ("(char? #\\a)", true),
        ("(procedure? car)", true),
        ("(procedure? (lambda () 1))", true),
        ("(vector? (vector))", true),
        ("(tag? (tag 'm 1))", true),
        ("(number? 2.5)", true),
        ("(eof-object? 1)", false),
    ];
    for (source, expected) in cases {
        assert_eq!(eval!(source, &mut interp), Datum::from(expected), "{}", source);
    }
    assert_eq!(eval!("(type 1)", &mut interp), Datum::symbol("integer"));
    assert_eq!(eval!("(type '(1))", &mut interp), Datum::symbol("pair"));
    assert_eq!(eval!("(type car)", &mut interp), Datum::symbol("procedure"));
}

#[test]
fn pairs_and_identity() {
    let mut interp = testing_interp();
    assert_eq!(eval!("(cons 1 2)", &mut interp), Datum::dotted(vec![Datum::from(1)], Datum::from(2)));
    assert_eq!(eval!("(car '(1 2))", &mut interp), Datum::from(1));
    assert_eq!(eval!("(cdr '(1 2))", &mut interp), ints(&[2]));
    assert_eq!(eval!("(define p (list 1 2)) (set-car! p 9) (set-cdr! (cdr p) '(3)) p", &mut interp), ints(&[9, 2, 3]));
    assert_eq!(eval!("(eq? 'a 'a)", &mut interp), Datum::from(true));
    assert_eq!(eval!("(eq? '() '())", &mut interp), Datum::from(true));
    assert_eq!(eval!("(eq? (list 1) (list 1))", &mut interp), Datum::from(false));
    assert!(matches!(eval_str_in("(car 1)", &mut interp), Err(LispError::InvalidDataType("pair", "integer"))));
    assert!(matches!(eval_str_in("(car '(1) '(2))", &mut interp), Err(LispError::IncorrectArguments(1, 2))));
}

#[test]
fn characters_and_strings() {
    let mut interp = testing_interp();
    assert_eq!(eval!("(char->integer #\\A)", &mut interp), Datum::from(65));
    assert_eq!(eval!("(integer->char 97)", &mut interp), Datum::from('a'));
    assert_eq!(eval!("(string-length \"hello\")", &mut interp), Datum::from(5));
    assert_eq!(eval!("(string-ref \"hello\" 1)", &mut interp), Datum::from('e'));
    assert_eq!(
        eval!("(define s (make-string 3)) (string-set! s 1 #\\x) s", &mut interp),
        Datum::string(" x "),
    );
    assert_eq!(eval!("(symbol->string 'abc)", &mut interp), Datum::string("abc"));
    assert_eq!(eval!("(string->symbol \"abc\")", &mut interp), Datum::symbol("abc"));
    assert_eq!(eval!("(string=? \"abc\" \"abc\")", &mut interp), Datum::from(true));
    assert_eq!(eval!("(string=? \"abc\" \"abd\")", &mut interp), Datum::from(false));
    assert!(matches!(eval_str_in("(string-ref \"abc\" 3)", &mut interp), Err(LispError::IndexOutOfRange(3))));
    assert!(matches!(eval_str_in("(integer->char -1)", &mut interp), Err(LispError::InvalidDataType(..))));
}

#[test]
fn number_text_conversion() {
    let mut interp = testing_interp();
    assert_eq!(eval!("(number->string 42)", &mut interp), Datum::string("42"));
    assert_eq!(eval!("(number->string 2.5)", &mut interp), Datum::string("2.5"));
    assert_eq!(eval!("(number->string 255 16)", &mut interp), Datum::string("ff"));
    assert_eq!(eval!("(number->string -5 2)", &mut interp), Datum::string("-101"));
    assert_eq!(eval!("(number->string 8 8)", &mut interp), Datum::string("10"));
    assert_eq!(eval!("(string->number \"42\")", &mut interp), Datum::from(42));
    assert_eq!(eval!("(string->number \"-1.5\")", &mut interp), Datum::from(-1.5));
    assert_eq!(eval!("(string->number \"ff\" 16)", &mut interp), Datum::from(255));
    assert_eq!(eval!("(string->number \"101\" 2)", &mut interp), Datum::from(5));
    assert_eq!(eval!("(string->number \"abc\")", &mut interp), Datum::from(false));
    assert!(matches!(eval_str_in("(string->number \"1\" 3)", &mut interp), Err(LispError::UnsupportedBase(3))));
    assert!(matches!(eval_str_in("(number->string 1.5 2)", &mut interp), Err(LispError::InvalidDataType(..))));
}

#[test]
fn vectors() {
    let mut interp = testing_interp();
    assert_eq!(eval!("(vector-length (make-vector 4))", &mut interp), Datum::from(4));
    assert_eq!(eval!("(vector-ref (make-vector 1) 0)", &mut interp), Datum::symbol("undefined"));
    assert_eq!(
        eval!("(define v (vector 1 2 3)) (vector-set! v 0 'a) v", &mut interp),
        Datum::Vector(vec![Datum::symbol("a"), Datum::from(2), Datum::from(3)]),
    );
    assert_eq!(eval!("(vector->list v)", &mut interp), Datum::list(vec![Datum::symbol("a"), Datum::from(2), Datum::from(3)]));
    assert_eq!(eval!("(list->vector '())", &mut interp), Datum::Vector(vec![]));
    assert!(matches!(eval_str_in("(vector-ref v -1)", &mut interp), Err(LispError::IndexOutOfRange(-1))));
    assert!(matches!(eval_str_in("(make-vector -2)", &mut interp), Err(LispError::IndexOutOfRange(-2))));
}

#[test]
fn tags_and_environments() {
    let mut interp = testing_interp();
    eval!("(define t (tag 'point (cons 1 2)))", &mut interp);
    assert_eq!(eval!("(tag-marker t)", &mut interp), Datum::symbol("point"));
    assert_eq!(eval!("(untag t)", &mut interp), Datum::dotted(vec![Datum::from(1)], Datum::from(2)));
    assert!(matches!(eval_str_in("(untag 1)", &mut interp), Err(LispError::InvalidDataType("tag", "integer"))));
    assert_eq!(eval!("(global-environment)", &mut interp), Datum::Environment);
}

#[test]
fn list_library() {
    let mut interp = testing_interp();
    assert_eq!(eval!("(list)", &mut interp), Datum::Null);
    assert_eq!(eval!("(length '(1 2 3))", &mut interp), Datum::from(3));
    assert_eq!(eval!("(reverse '(1 2 3))", &mut interp), ints(&[3, 2, 1]));
    assert_eq!(eval!("(append '(1 2) '(3))", &mut interp), ints(&[1, 2, 3]));
    assert_eq!(eval!("(map (lambda (x) (* x x)) '(1 2 3))", &mut interp), ints(&[1, 4, 9]));
    assert_eq!(eval!("(filter (lambda (x) (< x 3)) '(1 5 2 4))", &mut interp), ints(&[1, 2]));
    assert_eq!(eval!("(list-ref '(1 2 3) 2)", &mut interp), Datum::from(3));
    assert_eq!(eval!("(list-tail '(1 2 3) 1)", &mut interp), ints(&[2, 3]));
    assert_eq!(eval!("(memq 'c '(a b c d))", &mut interp), Datum::list(vec![Datum::symbol("c"), Datum::symbol("d")]));
    assert_eq!(eval!("(memq 'z '(a b))", &mut interp), Datum::from(false));
    assert_eq!(eval!("(cdr (assq 'b '((a . 1) (b . 2))))", &mut interp), Datum::from(2));
    assert_eq!(eval!("(cadr '(1 2 3))", &mut interp), Datum::from(2));
    assert_eq!(eval!("(caddr '(1 2 3))", &mut interp), Datum::from(3));
    assert_eq!(eval!("(equal? '(1 (2 #(3 \"x\"))) (list 1 (list 2 (vector 3 \"x\"))))", &mut interp), Datum::from(true));
    assert_eq!(eval!("(equal? '(1 2) '(1 3))", &mut interp), Datum::from(false));
    assert_eq!(
        eval!("(define seen '()) (for-each (lambda (x) (set! seen (cons x seen))) '(1 2)) seen", &mut interp),
        ints(&[2, 1]),
    );
}

#[test]
fn exit_stops_the_batch() {
    let mut interp = testing_interp();
    assert!(matches!(eval_str_in("(define x 1) (exit 3) (define x 2)", &mut interp), Err(LispError::Exit(3))));
    assert_eq!(eval!("x", &mut interp), Datum::from(1));
}

fn lisp_double(interp: &mut Interpreter, args: &[LispValue]) -> Result<Step> {
    let n = interp.heap().expect_integer(args[0])?;
    Ok(interp.heap_mut().integer(n * 2)?.into())
}

#[test]
fn host_defined_builtins() {
    let mut interp = testing_interp();
    interp.define_builtin(Builtin { name: "double", arity: 1, func: lisp_double }).unwrap();
    assert_eq!(eval!("(map double '(1 2))", &mut interp), ints(&[2, 4]));
    assert!(matches!(eval_str_in("(double)", &mut interp), Err(LispError::IncorrectArguments(1, 0))));

    let procedure = interp.lookup_global("double").unwrap();
    let procedure = interp.heap_mut().push_root(procedure);
    let arguments = interp.eval_str("'(21)").unwrap();
    let result = interp.apply(interp.heap().root(procedure), arguments).unwrap();
    assert_eq!(interp.datum(result).unwrap(), Datum::from(42));
}
