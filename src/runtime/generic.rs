//! Model-independent filler code.
//!
//! A small table of generic generators (numbers, strings, arrays, object
//! literals, comparisons, bounded loops). They only use host builtins and
//! values that are visible at the emission point, so the output is valid
//! whether or not the modeled extension exists.

use crate::{js_string_literal, Comparator, FuzzResult, ProgramBuilder, TypeDesc, Variable};

#[derive(Clone, Copy)]
pub struct GenericGenerator {
    pub name: &'static str,
    pub weight: u32,
    run: fn(&mut ProgramBuilder<'_>) -> FuzzResult<()>,
}

impl std::fmt::Debug for GenericGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenericGenerator")
            .field("name", &self.name)
            .field("weight", &self.weight)
            .finish()
    }
}

const LEAF_GENERATORS: &[GenericGenerator] = &[
    GenericGenerator { name: "Integer", weight: 3, run: integer },
    GenericGenerator { name: "String", weight: 3, run: string },
    GenericGenerator { name: "Arithmetic", weight: 4, run: arithmetic },
    GenericGenerator { name: "ArrayLiteral", weight: 3, run: array_literal },
    GenericGenerator { name: "ArrayPushPop", weight: 2, run: array_push_pop },
    GenericGenerator { name: "StringRepeat", weight: 2, run: string_repeat },
    GenericGenerator { name: "FromCharCode", weight: 1, run: from_char_code },
    GenericGenerator { name: "ObjectLiteral", weight: 2, run: object_literal },
    GenericGenerator { name: "JsonStringify", weight: 1, run: json_stringify },
    GenericGenerator { name: "Comparison", weight: 2, run: comparison },
    GenericGenerator { name: "MathMax", weight: 1, run: math_max },
];

const COMPOUND_GENERATORS: &[GenericGenerator] = &[
    GenericGenerator { name: "BoundedLoop", weight: 1, run: bounded_loop },
    GenericGenerator { name: "Conditional", weight: 1, run: conditional },
];

const INTERESTING_INTS: &[i64] = &[
    0,
    1,
    -1,
    2,
    7,
    16,
    255,
    256,
    1024,
    65535,
    2147483647,
    -2147483648,
];
const PROPERTY_KEYS: &[&str] = &["a", "b", "c", "foo", "bar", "length"];
const ARITHMETIC_OPS: &[&str] = &["+", "-", "*", "%", "|", "&", "^", "<<", ">>"];
const COMPARATORS: &[Comparator] = &[
    Comparator::StrictEqual,
    Comparator::StrictNotEqual,
    Comparator::LessThan,
    Comparator::GreaterThan,
];

/// All generic generators, leaves first.
pub fn generic_generators() -> impl Iterator<Item = &'static GenericGenerator> {
    LEAF_GENERATORS.iter().chain(COMPOUND_GENERATORS)
}

/// Emit `n` generic statements.
pub fn build_generic(b: &mut ProgramBuilder<'_>, n: u32) -> FuzzResult<()> {
    let table: Vec<&GenericGenerator> = generic_generators().collect();
    run_from(b, &table, n)
}

fn build_leaves(b: &mut ProgramBuilder<'_>, n: u32) -> FuzzResult<()> {
    let table: Vec<&GenericGenerator> = LEAF_GENERATORS.iter().collect();
    run_from(b, &table, n)
}

fn run_from(b: &mut ProgramBuilder<'_>, table: &[&GenericGenerator], n: u32) -> FuzzResult<()> {
    let weights: Vec<u32> = table.iter().map(|g| g.weight).collect();
    for _ in 0..n {
        let idx = b.entropy().weighted(&weights);
        if let Some(generator) = table.get(idx) {
            (generator.run)(b)?;
        }
    }
    Ok(())
}

fn is_exactly(ty: &TypeDesc, expected: &TypeDesc) -> bool {
    ty == expected
}

fn int_operand(b: &mut ProgramBuilder<'_>) -> Variable {
    let ints = b.visible_where(|t| is_exactly(t, &TypeDesc::integer()));
    if !ints.is_empty() && b.probability(0.5) {
        return *b.choose(&ints);
    }
    let n = *b.choose(INTERESTING_INTS);
    b.load_int(n)
}

fn string_operand(b: &mut ProgramBuilder<'_>) -> Variable {
    let strings = b.visible_where(|t| is_exactly(t, &TypeDesc::string()));
    if !strings.is_empty() && b.probability(0.5) {
        return *b.choose(&strings);
    }
    let s = b.random_string();
    b.load_string(&s)
}

fn integer(b: &mut ProgramBuilder<'_>) -> FuzzResult<()> {
    let n = *b.choose(INTERESTING_INTS);
    let lit = if n < 0 { format!("({n})") } else { n.to_string() };
    b.bind(lit, TypeDesc::integer());
    Ok(())
}

fn string(b: &mut ProgramBuilder<'_>) -> FuzzResult<()> {
    let s = b.random_string();
    b.bind(js_string_literal(&s), TypeDesc::string());
    Ok(())
}

fn arithmetic(b: &mut ProgramBuilder<'_>) -> FuzzResult<()> {
    let lhs = int_operand(b);
    let rhs = int_operand(b);
    let op = *b.choose(ARITHMETIC_OPS);
    let (l, r) = (b.expr(lhs), b.expr(rhs));
    b.bind(format!("{l} {op} {r}"), TypeDesc::integer());
    Ok(())
}

fn array_literal(b: &mut ProgramBuilder<'_>) -> FuzzResult<()> {
    let len = b.range(0, 4);
    let mut items = Vec::new();
    for _ in 0..len {
        let v = int_operand(b);
        items.push(b.expr(v));
    }
    b.bind(format!("[{}]", items.join(", ")), TypeDesc::iterable());
    Ok(())
}

fn array_push_pop(b: &mut ProgramBuilder<'_>) -> FuzzResult<()> {
    let arrays = b.visible_where(|t| is_exactly(t, &TypeDesc::iterable()));
    if arrays.is_empty() {
        return array_literal(b);
    }
    let arr = *b.choose(&arrays);
    let value = int_operand(b);
    let (a, v) = (b.expr(arr), b.expr(value));
    b.emit_statement(format!("{a}.push({v});"));
    if b.probability(0.5) {
        b.bind(format!("{a}.pop()"), TypeDesc::anything());
    } else {
        b.bind(format!("{a}.length"), TypeDesc::integer());
    }
    Ok(())
}

fn string_repeat(b: &mut ProgramBuilder<'_>) -> FuzzResult<()> {
    let s = string_operand(b);
    let count = b.range(0, 4);
    let s = b.expr(s);
    b.bind(format!("{s}.repeat({count})"), TypeDesc::string());
    Ok(())
}

fn from_char_code(b: &mut ProgramBuilder<'_>) -> FuzzResult<()> {
    let code = int_operand(b);
    let c = b.expr(code);
    b.bind(format!("String.fromCharCode({c})"), TypeDesc::string());
    Ok(())
}

fn object_literal(b: &mut ProgramBuilder<'_>) -> FuzzResult<()> {
    let count = b.range(0, 3) as usize;
    let mut fields = Vec::new();
    for key in PROPERTY_KEYS.iter().take(count) {
        let value = if b.probability(0.5) { int_operand(b) } else { string_operand(b) };
        fields.push(format!("{key}: {}", b.expr(value)));
    }
    let literal = if fields.is_empty() {
        "{}".to_string()
    } else {
        format!("{{ {} }}", fields.join(", "))
    };
    b.bind(literal, TypeDesc::plain_object());
    Ok(())
}

fn json_stringify(b: &mut ProgramBuilder<'_>) -> FuzzResult<()> {
    let candidates = b.visible_where(|t| {
        is_exactly(t, &TypeDesc::plain_object()) || is_exactly(t, &TypeDesc::iterable())
    });
    if candidates.is_empty() {
        return object_literal(b);
    }
    let v = *b.choose(&candidates);
    let e = b.expr(v);
    b.bind(format!("JSON.stringify({e})"), TypeDesc::string());
    Ok(())
}

fn comparison(b: &mut ProgramBuilder<'_>) -> FuzzResult<()> {
    let lhs = int_operand(b);
    let rhs = int_operand(b);
    let op = *b.choose(COMPARATORS);
    b.compare(lhs, rhs, op);
    Ok(())
}

fn math_max(b: &mut ProgramBuilder<'_>) -> FuzzResult<()> {
    let lhs = int_operand(b);
    let rhs = int_operand(b);
    let (l, r) = (b.expr(lhs), b.expr(rhs));
    b.bind(format!("Math.max({l}, {r})"), TypeDesc::integer());
    Ok(())
}

fn bounded_loop(b: &mut ProgramBuilder<'_>) -> FuzzResult<()> {
    let count = b.range(1, 4) as u32;
    let body = b.range(1, 2) as u32;
    b.build_repeat(count, |b, _| build_leaves(b, body))
}

fn conditional(b: &mut ProgramBuilder<'_>) -> FuzzResult<()> {
    let lhs = int_operand(b);
    let rhs = int_operand(b);
    let cond = b.compare(lhs, rhs, Comparator::LessThan);
    let body = b.range(1, 2) as u32;
    b.build_if(cond, |b| build_leaves(b, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{workerd_surface, GroupOrigin, SeededEntropy, Tuning};

    fn filler(seed: u64, n: u32) -> (String, usize) {
        let model = workerd_surface().expect("model");
        let tuning = Tuning::default();
        let mut entropy = SeededEntropy::new(seed);
        let mut b = ProgramBuilder::new(&model, &tuning, &mut entropy);
        build_generic(&mut b, n).expect("filler");
        let violations = b.scope_violations().len();
        (b.finish(), violations)
    }

    #[test]
    fn filler_never_touches_the_modeled_surface() {
        let model = workerd_surface().expect("model");
        let names = model.method_names(GroupOrigin::Surface);
        for seed in 0..64 {
            let (code, violations) = filler(seed, 20);
            assert_eq!(violations, 0, "seed {seed}:\n{code}");
            for name in &names {
                assert!(
                    !code.contains(&format!(".{name}(")),
                    "seed {seed} emitted .{name}(:\n{code}"
                );
            }
            for builtin in ["HTMLRewriter", "Response", "Headers"] {
                assert!(!code.contains(builtin), "seed {seed}:\n{code}");
            }
        }
    }

    #[test]
    fn filler_is_non_empty_and_deterministic() {
        let (a, _) = filler(11, 5);
        let (b, _) = filler(11, 5);
        assert_eq!(a, b);
        assert!(a.lines().count() >= 5);
    }

    #[test]
    fn table_names_are_unique() {
        let mut names: Vec<&str> = generic_generators().map(|g| g.name).collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
    }
}
