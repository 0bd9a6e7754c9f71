mod common;
use common::*;

const PAIR_BYTES: u32 = 13;

fn small_interp() -> Interpreter {
    let mut interp = Interpreter::with_heap_size(256).unwrap();
    interp.load_file(BOOTSTRAP).unwrap();
    interp
}

#[test]
fn bootstrap_survives_a_tiny_heap() {
    let mut interp = small_interp();
    assert!(interp.heap().collections() > 0);
    assert_eq!(
        eval!("(map inc (reverse '(1 2 3)))", &mut interp),
        Datum::list(vec![Datum::from(4), Datum::from(3), Datum::from(2)]),
    );
}

#[test]
fn dropped_pairs_are_reclaimed() {
    let mut interp = testing_interp();
    eval!("(define (build n acc) (if (= n 0) acc (build (- n 1) (cons n acc))))", &mut interp);
    eval!("(define big (build 1000 '()))", &mut interp);
    interp.collect().unwrap();
    let holding = interp.heap().used();
    eval!("(set! big '())", &mut interp);
    interp.collect().unwrap();
    let released = interp.heap().used();
    assert!(holding - released >= 1000 * PAIR_BYTES, "{} -> {}", holding, released);
}

#[test]
fn self_referential_pair() {
    let mut interp = testing_interp();
    eval!("(define p (cons 1 2)) (set-car! p p)", &mut interp);
    interp.collect().unwrap();
    interp.collect().unwrap();
    assert_eq!(eval!("(eq? (car p) p)", &mut interp), Datum::from(true));

    interp.collect().unwrap();
    let holding = interp.heap().used();
    eval!("(set! p #f)", &mut interp);
    interp.collect().unwrap();
    assert!(holding - interp.heap().used() >= PAIR_BYTES);
}

#[test]
fn live_data_survives_pressure() {
    let mut interp = small_interp();
    eval!("(define (iota n) (define (go i acc) (if (< i 0) acc (go (- i 1) (cons i acc)))) (go (- n 1) '()))
           (define (sum lst acc) (if (null? lst) acc (sum (cdr lst) (+ acc (car lst)))))
           (define keep (iota 5000))
           (define table (list->vector (iota 100)))", &mut interp);
    let before = interp.heap().collections();
    // churn: every iteration allocates garbage
    eval!("(define (churn n) (if (= n 0) 'ok (begin (iota 50) (churn (- n 1)))))
           (churn 500)", &mut interp);
    assert!(interp.heap().collections() > before);
    assert_eq!(eval!("(sum keep 0)", &mut interp), Datum::from(12497500));
    assert_eq!(eval!("(vector-ref table 99)", &mut interp), Datum::from(99));
    assert_eq!(eval!("(length keep)", &mut interp), Datum::from(5000));
}

#[test]
fn closures_and_frames_move_intact() {
    let mut interp = small_interp();
    eval!("(define (adder k) (lambda (x) (+ x k)))
           (define add5 (adder 5))
           (define (make-list n) (if (= n 0) '() (cons n (make-list (- n 1)))))", &mut interp);
    for _ in 0..20 {
        eval!("(make-list 200)", &mut interp);
        interp.collect().unwrap();
    }
    assert_eq!(eval!("(add5 10)", &mut interp), Datum::from(15));
}

#[test]
fn symbols_stay_interned_across_collections() {
    let mut interp = testing_interp();
    eval!("(define s 'hello-world)", &mut interp);
    eval!("(define (garbage n) (if (= n 0) 'ok (begin (symbol->string s) (garbage (- n 1)))))
           (garbage 100)", &mut interp);
    interp.collect().unwrap();
    assert_eq!(eval!("(eq? s (string->symbol \"hello-world\"))", &mut interp), Datum::from(true));
    assert_eq!(eval!("(eq? 'hello-world s)", &mut interp), Datum::from(true));
}

#[test]
fn startup_records_never_move() {
    let mut interp = testing_interp();
    let global = interp.global();
    let car = interp.lookup_global("car").unwrap();
    eval!("(define (make-list n) (if (= n 0) '() (cons n (make-list (- n 1)))))
           (make-list 500)", &mut interp);
    interp.collect().unwrap();
    interp.collect().unwrap();
    assert_eq!(interp.global(), global);
    assert_eq!(interp.lookup_global("car").unwrap(), car);
    assert_eq!(eval!("(car '(1 2))", &mut interp), Datum::from(1));
}
