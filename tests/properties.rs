use colorway::{parse, Bindings, Value};
use proptest::prelude::*;

/// Small integer arithmetic used to generate source text together with its
/// expected value.
#[derive(Debug, Clone)]
enum Arith {
    Num(i32),
    X,
    Neg(Box<Arith>),
    Bin(Box<Arith>, char, Box<Arith>),
    Pow(Box<Arith>, u32),
}

impl Arith {
    fn text(&self) -> String {
        match self {
            Arith::Num(n) if *n < 0 => format!("({n})"),
            Arith::Num(n) => n.to_string(),
            Arith::X => "x".to_string(),
            Arith::Neg(a) => format!("(-{})", a.text()),
            Arith::Bin(a, op, b) => format!("({} {op} {})", a.text(), b.text()),
            Arith::Pow(a, k) => format!("({} ^ {k})", a.text()),
        }
    }

    fn value(&self, x: f64) -> f64 {
        match self {
            Arith::Num(n) => f64::from(*n),
            Arith::X => x,
            Arith::Neg(a) => -a.value(x),
            Arith::Bin(a, '+', b) => a.value(x) + b.value(x),
            Arith::Bin(a, '-', b) => a.value(x) - b.value(x),
            Arith::Bin(a, _, b) => a.value(x) * b.value(x),
            Arith::Pow(a, k) => a.value(x).powf(f64::from(*k)),
        }
    }
}

fn arith() -> impl Strategy<Value = Arith> {
    let leaf = prop_oneof![(-9i32..=9).prop_map(Arith::Num), Just(Arith::X)];
    leaf.prop_recursive(4, 24, 2, |inner| {
        prop_oneof![
            inner.clone().prop_map(|a| Arith::Neg(Box::new(a))),
            (inner.clone(), prop_oneof![Just('+'), Just('-'), Just('*')], inner.clone())
                .prop_map(|(a, op, b)| Arith::Bin(Box::new(a), op, Box::new(b))),
            (inner, 0u32..=3).prop_map(|(a, k)| Arith::Pow(Box::new(a), k)),
        ]
    })
}

fn with_x(x: i32) -> Bindings {
    let mut bindings = Bindings::new();
    bindings.insert("x".to_string(), Value::Number(f64::from(x)));
    bindings
}

fn number(value: Value) -> f64 {
    match value {
        Value::Number(n) => n,
        other => panic!("expected a number, got {other:?}"),
    }
}

/// Applies `*` before `+`/`-`, each left to right.
fn chain_value(first: i32, rest: &[(char, i32)]) -> f64 {
    let mut terms = vec![f64::from(first)];
    let mut signs = vec![1.0];
    for (op, n) in rest {
        let n = f64::from(*n);
        match op {
            '*' => {
                if let Some(last) = terms.last_mut() {
                    *last *= n;
                }
            }
            '+' => {
                terms.push(n);
                signs.push(1.0);
            }
            _ => {
                terms.push(n);
                signs.push(-1.0);
            }
        }
    }
    terms.iter().zip(&signs).map(|(t, s)| t * s).sum()
}

proptest! {
    #[test]
    fn evaluation_matches_reference(expr in arith(), x in -5i32..=5) {
        let expected = expr.value(f64::from(x));
        prop_assume!(expected.is_finite());
        let parsed = parse(&expr.text()).unwrap();
        prop_assert_eq!(number(parsed.evaluate(&with_x(x)).unwrap()), expected);
    }

    #[test]
    fn unparenthesised_chains_respect_precedence(
        first in 0i32..=20,
        rest in proptest::collection::vec((prop_oneof![Just('+'), Just('-'), Just('*')], 0i32..=20), 0..6)
    ) {
        let mut text = first.to_string();
        for (op, n) in &rest {
            text.push_str(&format!(" {op} {n}"));
        }
        let value = parse(&text).unwrap().evaluate(&Bindings::new()).unwrap();
        prop_assert_eq!(number(value), chain_value(first, &rest));
    }

    #[test]
    fn display_round_trips(expr in arith(), x in -5i32..=5) {
        let parsed = parse(&expr.text()).unwrap();
        let reparsed = parse(&parsed.to_string()).unwrap();
        let a = number(parsed.evaluate(&with_x(x)).unwrap());
        let b = number(reparsed.evaluate(&with_x(x)).unwrap());
        prop_assert!(a == b || (a.is_nan() && b.is_nan()));
    }

    #[test]
    fn simplify_is_idempotent(expr in arith(), x in -5i32..=5, bind_x in any::<bool>()) {
        let partial = if bind_x { with_x(x) } else { Bindings::new() };
        let once = parse(&expr.text()).unwrap().simplify(&partial);
        let twice = once.simplify(&partial);
        let a = number(once.evaluate(&with_x(x)).unwrap());
        let b = number(twice.evaluate(&with_x(x)).unwrap());
        prop_assert!(a == b || (a.is_nan() && b.is_nan()));
        if bind_x {
            prop_assert!(once.variables().is_empty());
        }
    }
}
