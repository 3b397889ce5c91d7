use colorway::{
    parse, Arity, Assoc, Bindings, EvalError, ExpressionParser, Grammar, ParseError, Value,
};

fn eval(text: &str) -> Value {
    parse(text).unwrap().evaluate(&Bindings::new()).unwrap()
}

fn bindings(pairs: &[(&str, Value)]) -> Bindings {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

// ── Calculator semantics ──

#[test]
fn arithmetic_follows_standard_precedence() {
    assert_eq!(eval("2 + 3 * 4"), Value::Number(14.0));
    assert_eq!(eval("(2 + 3) * 4"), Value::Number(20.0));
    assert_eq!(eval("2 ^ 3 ^ 2"), Value::Number(512.0));
    assert_eq!(eval("-2 ^ 2"), Value::Number(-4.0));
    assert_eq!(eval("10 - 4 - 3"), Value::Number(3.0));
    assert_eq!(eval("7 % 4 * 2"), Value::Number(6.0));
}

#[test]
fn comparisons_and_logic() {
    assert_eq!(eval("1 < 2 and 3 >= 3"), Value::Bool(true));
    assert_eq!(eval("1 == 2 or not false"), Value::Bool(true));
    assert_eq!(eval("2 in [1, 2, 3]"), Value::Bool(true));
    assert_eq!(eval("true ? 1 : 2"), Value::Number(1.0));
    assert_eq!(eval("1 > 2 ? \"big\" : \"small\""), Value::from("small"));
}

#[test]
fn builtins() {
    assert_eq!(eval("max(1, 5, 3)"), Value::Number(5.0));
    assert_eq!(eval("hypot(3, 4)"), Value::Number(5.0));
    assert_eq!(eval("roundTo(PI, 2)"), Value::Number(3.14));
    assert_eq!(eval("clamp(15, 0, 10)"), Value::Number(10.0));
    assert_eq!(eval("sqrt 16 + abs(-2)"), Value::Number(6.0));
    assert_eq!(eval("\"ab\" || \"cd\""), Value::from("abcd"));
    assert_eq!(eval("length \"hello\""), Value::Number(5.0));
}

#[test]
fn statements_yield_the_last_value() {
    assert_eq!(eval("1; 2; 3"), Value::Number(3.0));
}

// ── Variables ──

#[test]
fn unbound_variable_contract() {
    let expr = parse("x + 1").unwrap();
    assert_eq!(
        expr.evaluate(&Bindings::new()),
        Err(EvalError::UnboundVariable("x".to_string()))
    );
    assert_eq!(
        expr.evaluate(&bindings(&[("x", Value::Number(5.0))])).unwrap(),
        Value::Number(6.0)
    );
}

#[test]
fn calling_an_unknown_name_is_an_unknown_function() {
    let expr = parse("foo(1)").unwrap();
    assert_eq!(
        expr.evaluate(&Bindings::new()),
        Err(EvalError::UnknownFunction("foo".to_string()))
    );
    assert_eq!(
        expr.evaluate(&bindings(&[("foo", Value::Number(1.0))])),
        Err(EvalError::NotCallable("number".to_string()))
    );
    assert_eq!(
        parse("foo").unwrap().evaluate(&Bindings::new()),
        Err(EvalError::UnboundVariable("foo".to_string()))
    );
}

#[test]
fn clamp_with_nan_bound_is_an_error() {
    assert!(matches!(
        parse("clamp(1, 0 / 0, 2)").unwrap().evaluate(&Bindings::new()),
        Err(EvalError::Type { .. })
    ));
}

#[test]
fn variables_lists_free_names_once() {
    let expr = parse("a * b + a + max(c, 1) + PI").unwrap();
    assert_eq!(expr.variables(), vec!["a", "b", "c"]);
}

#[test]
fn member_and_index_access() {
    let mut color = Bindings::new();
    color.insert("l".into(), Value::Number(65.0));
    let env = bindings(&[
        ("color", Value::Map(color)),
        ("list", Value::from(vec![Value::from("x"), Value::from("y")])),
    ]);
    let expr = parse("color.l > 50 and list[1] == \"y\"").unwrap();
    assert_eq!(expr.evaluate(&env).unwrap(), Value::Bool(true));
}

// ── Transformations ──

#[test]
fn simplify_folds_known_parts() {
    let expr = parse("x * (2 + 3) + y").unwrap();
    let folded = expr.simplify(&bindings(&[("y", Value::Number(1.0))]));
    assert_eq!(folded.to_string(), "((x * 5) + 1)");
    assert_eq!(
        folded.evaluate(&bindings(&[("x", Value::Number(2.0))])).unwrap(),
        Value::Number(11.0)
    );
}

#[test]
fn substitute_replaces_every_occurrence() {
    let expr = parse("x * x + 1").unwrap();
    let replaced = expr.substitute_text("x", "y + 1").unwrap();
    assert_eq!(replaced.variables(), vec!["y"]);
    assert_eq!(
        replaced.evaluate(&bindings(&[("y", Value::Number(2.0))])).unwrap(),
        Value::Number(10.0)
    );
}

#[test]
fn bound_expression_is_callable() {
    let expr = parse("a * x + b").unwrap();
    let line = expr.bind(&["x"], &bindings(&[("a", Value::Number(2.0)), ("b", Value::Number(1.0))]));
    assert_eq!(line(&[Value::Number(3.0)]).unwrap(), Value::Number(7.0));
    assert!(matches!(line(&[]), Err(EvalError::Arity { .. })));
}

#[test]
fn display_round_trips() {
    let env = bindings(&[("x", Value::Number(3.0)), ("y", Value::Number(-2.0))]);
    for text in [
        "x - -y",
        "-x ^ 2",
        "x > 1 ? y : -y",
        "min(x, y) * (x + y) / 2",
        "sqrt(x) ^ 2",
        "\"a\\\"b\" || \"c\"",
        "x; y",
    ] {
        let expr = parse(text).unwrap();
        let reparsed = parse(&expr.to_string()).unwrap();
        assert_eq!(
            expr.evaluate(&env).unwrap(),
            reparsed.evaluate(&env).unwrap(),
            "{text} -> {expr}"
        );
    }
}

#[test]
fn folded_member_targets_still_parse() {
    let folded = parse("(2 + 3).length").unwrap().simplify(&Bindings::new());
    assert_eq!(folded.to_string(), "(5).length");
    assert!(parse(&folded.to_string()).is_ok());
}

// ── Grammars ──

#[test]
fn grammars_are_independent() {
    let custom = ExpressionParser::new(
        Grammar::standard()
            .with_binary("<>", 30, Assoc::Left, |a, b| Ok(Value::Bool(a != b)))
            .with_function("twice", Arity::Exact(1), |args| {
                Ok(Value::Number(args[0].as_number("twice")? * 2.0))
            }),
    );
    let expr = custom.parse("twice(2) <> 5").unwrap();
    assert_eq!(expr.evaluate(&Bindings::new()).unwrap(), Value::Bool(true));

    assert!(parse("1 <> 2").is_err());
    assert_eq!(
        parse("twice(2)").unwrap().evaluate(&Bindings::new()),
        Err(EvalError::UnknownFunction("twice".to_string()))
    );
}

#[test]
fn parse_errors_carry_positions() {
    assert!(matches!(parse("1 +"), Err(ParseError::Expected { position: 3, .. })));
    assert!(matches!(parse("(1 + 2"), Err(ParseError::Expected { .. })));
    assert!(matches!(parse(")"), Err(ParseError::Unexpected { position: 0, .. })));
    assert!(matches!(parse("* 2"), Err(ParseError::MissingOperand { .. })));
    assert!(matches!(parse("1 2"), Err(ParseError::TrailingInput { position: 2, .. })));
    assert!(matches!(parse("\"open"), Err(ParseError::Tokenize(_))));
}
