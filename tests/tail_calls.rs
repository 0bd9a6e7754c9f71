mod common;
use common::*;

#[test]
fn self_recursion_in_tail_position() {
    let mut interp = testing_interp();
    eval!("(define (eqNum a b) (= a b))
           (define (loop n) (if (eqNum n 0) 'done (loop (dec n))))", &mut interp);
    assert_eq!(eval!("(loop 1000000)", &mut interp), Datum::symbol("done"));
}

#[test]
fn mutual_recursion() {
    let mut interp = testing_interp();
    eval!("(define (even? n) (if (= n 0) #t (odd? (- n 1))))
           (define (odd? n) (if (= n 0) #f (even? (- n 1))))", &mut interp);
    assert_eq!(eval!("(even? 100001)", &mut interp), Datum::from(false));
    assert_eq!(eval!("(odd? 100001)", &mut interp), Datum::from(true));
}

#[test]
fn tail_position_through_begin_and_macros() {
    let mut interp = testing_interp();
    eval!("(define (count-down n acc)
               (begin
                 (define next (- n 1))
                 (cond ((= n 0) acc)
                       (else (count-down next (+ acc 1))))))", &mut interp);
    assert_eq!(eval!("(count-down 200000 0)", &mut interp), Datum::from(200000));
}

#[test]
fn apply_shares_the_trampoline() {
    let mut interp = testing_interp();
    eval!("(define (spin n) (if (= n 0) 'done (apply spin (list (- n 1)))))", &mut interp);
    assert_eq!(eval!("(spin 200000)", &mut interp), Datum::symbol("done"));
    assert_eq!(eval!("(apply + '(1 2))", &mut interp), Datum::from(3));
    assert_eq!(eval!("(apply (lambda args args) '())", &mut interp), Datum::Null);
}

#[test]
fn accumulating_loop_result() {
    let mut interp = testing_interp();
    eval!("(define (sum-to n acc) (if (= n 0) acc (sum-to (- n 1) (+ acc n))))", &mut interp);
    assert_eq!(eval!("(sum-to 100000 0)", &mut interp), Datum::from(5000050000i64));
}

#[test]
fn root_stack_is_balanced() {
    let mut interp = testing_interp();
    let before = interp.heap().root_mark();
    eval!("(define (loop n) (if (= n 0) 0 (loop (- n 1)))) (loop 1000)", &mut interp);
    assert!(eval_str_in("(loop 'x)", &mut interp).is_err());
    assert_eq!(interp.heap().root_mark(), before);
}
