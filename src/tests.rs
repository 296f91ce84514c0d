#[cfg(test)]
mod tests {
    use crate::*;

    #[test]
    fn power_is_right_associative() {
        let mut env = Environment::new();
        let (v, _) = eval("2**3**2", &mut env).unwrap();
        assert_eq!(v, 512.0);
    }

    #[test]
    fn parens_override_right_associativity() {
        let mut env = Environment::new();
        let (v, _) = eval("(2**3)**2", &mut env).unwrap();
        assert_eq!(v, 64.0);
    }

    /// An oracle whose `call_function` panics if ever invoked, used to prove
    /// short-circuit operators never evaluate their right-hand side.
    struct CrashIfCalled(Environment);

    impl Oracle for CrashIfCalled {
        fn lookup(&mut self, text: &str, pos: usize) -> LookupResult {
            self.0.lookup(text, pos)
        }
        fn value(&mut self, lv: &LValue, ctx: &mut OracleCtx) -> Result<(f64, Domain), ArithError> {
            self.0.value(lv, ctx)
        }
        fn assign(&mut self, lv: &LValue, ctx: &mut OracleCtx, value: f64) -> Result<f64, ArithError> {
            self.0.assign(lv, ctx, value)
        }
        fn call_function(&mut self, _func: FuncId, _kind: FuncKind, _args: &[f64]) -> Result<(f64, Domain), ArithError> {
            panic!("short-circuit evaluated its right-hand side")
        }
    }

    #[test]
    fn and_and_short_circuits_before_calling_the_oracle() {
        let mut env = CrashIfCalled(Environment::new());
        let (v, d) = eval("0 && pow(2,10)", &mut env).unwrap();
        assert_eq!(v, 0.0);
        assert_eq!(d, Domain::Signed);
    }

    #[test]
    fn or_or_short_circuits_before_calling_the_oracle() {
        let mut env = CrashIfCalled(Environment::new());
        let (v, d) = eval("1 || pow(2,10)", &mut env).unwrap();
        assert_eq!(v, 1.0);
        assert_eq!(d, Domain::Signed);
    }

    #[test]
    fn compound_assignment_then_plain_reference_sees_updated_value() {
        let mut env = Environment::new();
        let (v, _) = eval("a=5, a+=3, a*2", &mut env).unwrap();
        assert_eq!(v, 16.0);
        assert_eq!(env.get_var("a"), Some(8.0));
    }

    /// An oracle that counts how many times a given cell is read, to prove
    /// the ternary condition is evaluated exactly once.
    struct CountingReads {
        inner: Environment,
        reads_of: u32,
        count: u32,
    }

    impl Oracle for CountingReads {
        fn lookup(&mut self, text: &str, pos: usize) -> LookupResult {
            self.inner.lookup(text, pos)
        }
        fn value(&mut self, lv: &LValue, ctx: &mut OracleCtx) -> Result<(f64, Domain), ArithError> {
            if lv.cell.0 == self.reads_of {
                self.count += 1;
            }
            self.inner.value(lv, ctx)
        }
        fn assign(&mut self, lv: &LValue, ctx: &mut OracleCtx, value: f64) -> Result<f64, ArithError> {
            self.inner.assign(lv, ctx, value)
        }
        fn call_function(&mut self, func: FuncId, kind: FuncKind, args: &[f64]) -> Result<(f64, Domain), ArithError> {
            self.inner.call_function(func, kind, args)
        }
    }

    #[test]
    fn ternary_condition_is_fetched_exactly_once() {
        let mut inner = Environment::new();
        inner.set_var("x", 0.0, Domain::Signed);
        let x_id = 0; // first variable allocated below
        let mut env = CountingReads { inner, reads_of: x_id, count: 0 };
        let (v, _) = eval("x?10:20", &mut env).unwrap();
        assert_eq!(v, 20.0);
        assert_eq!(env.count, 1);
    }

    #[test]
    fn relational_chain_with_and_and_produces_signed_one() {
        let mut env = Environment::new();
        let (v, d) = eval("1<2 && 3<4", &mut env).unwrap();
        assert_eq!(v, 1.0);
        assert_eq!(d, Domain::Signed);
    }

    #[test]
    fn pow_call_returns_float_domain() {
        let mut env = Environment::new();
        let (v, d) = eval("pow(2,10)", &mut env).unwrap();
        assert_eq!(v, 1024.0);
        assert_eq!(d, Domain::Float);
    }

    #[test]
    fn integer_division_by_zero_errors() {
        let mut env = Environment::new();
        assert_eq!(eval("1/0", &mut env), Err(ArithError::DivZero));
    }

    #[test]
    fn integer_modulo_by_zero_errors() {
        let mut env = Environment::new();
        assert_eq!(eval("1%0", &mut env), Err(ArithError::DivZero));
    }

    #[test]
    fn float_division_by_zero_errors() {
        let mut env = Environment::new();
        assert_eq!(eval("1.0/0", &mut env), Err(ArithError::DivZero));
    }

    #[test]
    fn modulo_on_float_operands_is_incompatible() {
        let mut env = Environment::new();
        assert_eq!(eval("1.5%2", &mut env), Err(ArithError::Incompatible));
    }

    #[test]
    fn compiling_the_same_text_twice_is_idempotent() {
        let mut env = Environment::new();
        let a = compile("1+2*3-4/2", &mut env).unwrap();
        let b = compile("1+2*3-4/2", &mut env).unwrap();
        assert_eq!(a.code(), b.code());
        assert_eq!(a.max_stack_depth, b.max_stack_depth);
    }

    #[test]
    fn postfix_increment_yields_the_pre_increment_value() {
        let mut env = Environment::new();
        env.set_var("i", 5.0, Domain::Signed);
        let (v, _) = eval("i++", &mut env).unwrap();
        assert_eq!(v, 5.0);
        assert_eq!(env.get_var("i"), Some(6.0));
    }

    #[test]
    fn prefix_increment_yields_the_post_increment_value() {
        let mut env = Environment::new();
        env.set_var("i", 5.0, Domain::Signed);
        let (v, _) = eval("++i", &mut env).unwrap();
        assert_eq!(v, 6.0);
        assert_eq!(env.get_var("i"), Some(6.0));
    }

    #[test]
    fn postfix_increment_retags_a_value_too_large_for_signed() {
        let mut env = Environment::new();
        let huge = (i64::MAX as f64) + 1.0;
        env.set_var("u", huge, Domain::Signed);
        let (v, d) = eval("u++", &mut env).unwrap();
        assert_eq!(v, huge);
        assert_eq!(d, Domain::Unsigned);
        assert_eq!(env.get_var("u"), Some(huge + 1.0));
    }

    #[test]
    fn elvis_keeps_the_truthy_left_value_without_canonicalizing() {
        let mut env = Environment::new();
        env.set_var("a", 7.0, Domain::Signed);
        let (v, _) = eval("a?:99", &mut env).unwrap();
        assert_eq!(v, 7.0);
    }

    #[test]
    fn elvis_falls_through_to_the_right_side_when_falsy() {
        let mut env = Environment::new();
        env.set_var("a", 0.0, Domain::Signed);
        let (v, _) = eval("a?:99", &mut env).unwrap();
        assert_eq!(v, 99.0);
    }

    #[test]
    fn deeply_nested_parens_and_ternaries_compile_and_run() {
        let mut env = Environment::new();
        let (v, _) = eval("((1?2:3)+(4?5:6))*((7?8:9)-(0?1:2))", &mut env).unwrap();
        assert_eq!(v, (2.0 + 5.0) * (8.0 - 2.0));
    }

    #[test]
    fn a_variable_assigned_before_strict_mode_reads_fine_under_it() {
        let mut env = Environment::new();
        env.set_strict_unset(true);
        env.set_var("known", 1.0, Domain::Signed);
        assert_eq!(eval("known", &mut env), Ok((1.0, Domain::Signed)));
    }

    /// A small recursive grammar over the binary/ternary operators plus a
    /// handful of named variables and small integer literals, used to fuzz
    /// compile/execute against structural invariants rather than a specific
    /// expected value.
    fn arb_expr() -> impl proptest::strategy::Strategy<Value = String> {
        use proptest::prelude::*;
        let leaf = prop_oneof![
            (0i64..100).prop_map(|n| n.to_string()),
            Just("a".to_string()),
            Just("b".to_string()),
            Just("c".to_string()),
        ];
        leaf.prop_recursive(4, 64, 4, |inner| {
            prop_oneof![
                (inner.clone(), inner.clone()).prop_map(|(l, r)| format!("({l}+{r})")),
                (inner.clone(), inner.clone()).prop_map(|(l, r)| format!("({l}-{r})")),
                (inner.clone(), inner.clone()).prop_map(|(l, r)| format!("({l}*{r})")),
                (inner.clone(), inner.clone()).prop_map(|(l, r)| format!("({l}<{r})")),
                (inner.clone(), inner.clone()).prop_map(|(l, r)| format!("({l}&&{r})")),
                (inner.clone(), inner.clone()).prop_map(|(l, r)| format!("({l}||{r})")),
                (inner.clone(), inner.clone(), inner.clone()).prop_map(|(c, t, f)| format!("({c}?{t}:{f})")),
            ]
        })
    }

    proptest::proptest! {
        #[test]
        fn arbitrary_well_formed_expressions_compile_and_run_without_violating_invariants(expr in arb_expr()) {
            let mut env = Environment::new();
            env.set_var("a", 3.0, Domain::Signed);
            env.set_var("b", 5.0, Domain::Signed);
            env.set_var("c", 0.0, Domain::Signed);
            let prog = compile(&expr, &mut env).unwrap();
            crate::program::assert_jumps_well_formed(&prog);
            let _ = execute(&prog, &mut env);
        }
    }

    proptest::proptest! {
        #[test]
        fn assignop1_and_assignop_stay_matched_across_compound_assignments(
            start in -1000i64..1000,
            delta in -1000i64..1000,
        ) {
            let mut env = Environment::new();
            env.set_var("v", start as f64, Domain::Signed);
            let expr = format!("v+={delta}");
            let (result, _) = eval(&expr, &mut env).unwrap();
            proptest::prop_assert_eq!(result, (start + delta) as f64);
            proptest::prop_assert_eq!(env.get_var("v"), Some((start + delta) as f64));
        }
    }
}
