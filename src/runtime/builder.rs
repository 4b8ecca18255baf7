//! Program builder: the emission buffer threaded through every generator.
//!
//! One builder owns the output of one generation pass. Every model-backed
//! operation (`construct`, `call_method`, `get_property`, `set_property`,
//! `create_object`) is checked against the [`SurfaceModel`]; an undeclared
//! operation is a [`FuzzError::Generation`] and aborts the pass.
//!
//! Literals and builtins are inlined at their use sites. Everything else is
//! bound to a fresh `const`. Bindings are block scoped: a value bound inside
//! a function, branch or loop body is not visible once that body closes, and
//! referencing it anyway is recorded as a scope violation.

use crate::{Entropy, FuzzError, FuzzResult, Param, SurfaceModel, Tuning, TypeDesc};

/// Handle to a value emitted by a [`ProgramBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Variable(usize);

#[derive(Debug, Clone)]
struct Binding {
    expr: String,
    ty: TypeDesc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    StrictEqual,
    StrictNotEqual,
    LessThan,
    GreaterThan,
}

impl Comparator {
    fn token(self) -> &'static str {
        match self {
            Self::StrictEqual => "===",
            Self::StrictNotEqual => "!==",
            Self::LessThan => "<",
            Self::GreaterThan => ">",
        }
    }
}

pub struct ProgramBuilder<'a> {
    model: &'a SurfaceModel,
    tuning: &'a Tuning,
    entropy: &'a mut dyn Entropy,
    bindings: Vec<Binding>,
    scopes: Vec<Vec<Variable>>,
    lines: Vec<String>,
    next_name: usize,
    violations: Vec<String>,
}

impl<'a> ProgramBuilder<'a> {
    pub fn new(model: &'a SurfaceModel, tuning: &'a Tuning, entropy: &'a mut dyn Entropy) -> Self {
        Self {
            model,
            tuning,
            entropy,
            bindings: Vec::new(),
            scopes: vec![Vec::new()],
            lines: Vec::new(),
            next_name: 0,
            violations: Vec::new(),
        }
    }

    pub fn model(&self) -> &'a SurfaceModel {
        self.model
    }

    pub fn tuning(&self) -> &'a Tuning {
        self.tuning
    }

    pub fn entropy(&mut self) -> &mut dyn Entropy {
        &mut *self.entropy
    }

    // Random decisions.

    pub fn probability(&mut self, p: f64) -> bool {
        self.entropy.bernoulli(p)
    }

    pub fn choose<'c, T>(&mut self, items: &'c [T]) -> &'c T {
        &items[self.entropy.index(items.len()).min(items.len().saturating_sub(1))]
    }

    pub fn range(&mut self, min: i64, max: i64) -> i64 {
        self.entropy.range(min, max)
    }

    pub fn random_string(&mut self) -> String {
        self.entropy.text()
    }

    // Literals and builtins.

    pub fn load_string(&mut self, value: &str) -> Variable {
        self.register(js_string_literal(value), TypeDesc::string())
    }

    /// Like [`Self::load_string`] but bound to its own `const`, for payloads
    /// that are referenced more than once or are too long to inline.
    pub fn named_string(&mut self, value: &str) -> Variable {
        self.bind(js_string_literal(value), TypeDesc::string())
    }

    pub fn load_int(&mut self, value: i64) -> Variable {
        let expr = if value < 0 { format!("({value})") } else { value.to_string() };
        self.register(expr, TypeDesc::integer())
    }

    pub fn load_bool(&mut self, value: bool) -> Variable {
        self.register(value.to_string(), TypeDesc::boolean())
    }

    /// Reference a global declared by the model, e.g. `HTMLRewriter`.
    pub fn named_builtin(&mut self, name: &str) -> FuzzResult<Variable> {
        let ty = self.model.builtin(name).ok_or_else(|| {
            FuzzError::Generation(format!(
                "builtin {name:?} is not declared by the surface model"
            ))
        })?;
        Ok(self.register(name.to_string(), ty.clone()))
    }

    /// `typeof <builtin>`, used by capability probes.
    pub fn eval_typeof(&mut self, name: &str) -> FuzzResult<Variable> {
        if self.model.builtin(name).is_none() {
            return Err(FuzzError::Generation(format!(
                "cannot probe {name:?}: not declared by the surface model"
            )));
        }
        Ok(self.bind(format!("typeof {name}"), TypeDesc::string()))
    }

    // Model-checked operations.

    pub fn construct(&mut self, ctor: Variable, args: &[Variable]) -> FuzzResult<Variable> {
        let ctor_ty = self.type_of(ctor).clone();
        let arg_tys = self.types_of(args);
        let sig = ctor_ty
            .construct_signature()
            .ok_or_else(|| FuzzError::Generation(format!("{ctor_ty} is not constructible")))?;
        if !sig.accepts_args(&arg_tys) {
            return Err(FuzzError::Generation(format!(
                "new {}: arguments {} do not match {sig}",
                self.peek_expr(ctor),
                describe(&arg_tys)
            )));
        }
        let returns = sig.returns.clone();
        let callee = self.expr(ctor);
        let argv = self.exprs(args);
        Ok(self.bind(format!("new {callee}({argv})"), returns))
    }

    pub fn call_method(
        &mut self,
        obj: Variable,
        method: &str,
        args: &[Variable],
    ) -> FuzzResult<Variable> {
        let model = self.model;
        let recv_ty = self.type_of(obj).clone();
        let arg_tys = self.types_of(args);
        let Some(sig) = model.resolve_call(&recv_ty, method, &arg_tys) else {
            return Err(match model.method_signature(&recv_ty, method) {
                None => FuzzError::Generation(format!(
                    "method {method:?} is not declared for {recv_ty}"
                )),
                Some(sig) => FuzzError::Generation(format!(
                    "{recv_ty}.{method}: arguments {} do not match {sig}",
                    describe(&arg_tys)
                )),
            });
        };
        let recv = self.expr(obj);
        let argv = self.exprs(args);
        Ok(self.bind(format!("{recv}.{method}({argv})"), sig.returns.clone()))
    }

    pub fn get_property(&mut self, obj: Variable, property: &str) -> FuzzResult<Variable> {
        let model = self.model;
        let recv_ty = self.type_of(obj).clone();
        let ty = model.property_type(&recv_ty, property).ok_or_else(|| {
            FuzzError::Generation(format!("property {property:?} is not declared for {recv_ty}"))
        })?;
        let recv = self.expr(obj);
        Ok(self.bind(format!("{recv}.{property}"), ty.clone()))
    }

    pub fn set_property(
        &mut self,
        obj: Variable,
        property: &str,
        value: Variable,
    ) -> FuzzResult<()> {
        let model = self.model;
        let recv_ty = self.type_of(obj).clone();
        let value_ty = self.type_of(value).clone();
        let ty = model.property_type(&recv_ty, property).ok_or_else(|| {
            FuzzError::Generation(format!("property {property:?} is not declared for {recv_ty}"))
        })?;
        if !ty.accepts(&value_ty) {
            return Err(FuzzError::Generation(format!(
                "{recv_ty}.{property} expects {ty}, got {value_ty}"
            )));
        }
        let recv = self.expr(obj);
        let rhs = self.expr(value);
        self.emit(format!("{recv}.{property} = {rhs};"));
        Ok(())
    }

    /// Object literal of a declared group. Every property must be declared.
    pub fn create_object(
        &mut self,
        ty: TypeDesc,
        properties: &[(&str, Variable)],
    ) -> FuzzResult<Variable> {
        let model = self.model;
        let Some(group) = ty.group_name().and_then(|g| model.group(g)) else {
            return Err(FuzzError::Generation(format!(
                "{ty} does not name a declared object group"
            )));
        };
        let mut fields = Vec::with_capacity(properties.len());
        for (name, value) in properties {
            let value_ty = self.type_of(*value).clone();
            let Some(expected) = group.properties.get(*name) else {
                return Err(FuzzError::Generation(format!(
                    "property {name:?} is not declared by group {}",
                    group.name
                )));
            };
            if !expected.accepts(&value_ty) {
                return Err(FuzzError::Generation(format!(
                    "{}.{name} expects {expected}, got {value_ty}",
                    group.name
                )));
            }
            let rhs = self.expr(*value);
            fields.push(format!("{name}: {rhs}"));
        }
        let literal = if fields.is_empty() {
            "{}".to_string()
        } else {
            format!("{{ {} }}", fields.join(", "))
        };
        Ok(self.bind(literal, ty))
    }

    pub fn compare(&mut self, lhs: Variable, rhs: Variable, op: Comparator) -> Variable {
        let a = self.expr(lhs);
        let b = self.expr(rhs);
        self.bind(format!("{a} {} {b}", op.token()), TypeDesc::boolean())
    }

    pub fn logical_and(&mut self, lhs: Variable, rhs: Variable) -> Variable {
        let a = self.expr(lhs);
        let b = self.expr(rhs);
        self.bind(format!("{a} && {b}"), TypeDesc::boolean())
    }

    // Code regions.

    /// Plain function with one parameter per entry of `params`. The
    /// parameters are only visible inside `body`.
    pub fn build_function(
        &mut self,
        params: &[TypeDesc],
        body: impl FnOnce(&mut Self, &[Variable]) -> FuzzResult<()>,
    ) -> FuzzResult<Variable> {
        let name = self.fresh_name('f');
        let names: Vec<String> = params.iter().map(|_| self.fresh_name('a')).collect();
        self.emit(format!("function {name}({}) {{", names.join(", ")));
        self.scopes.push(Vec::new());
        let args: Vec<Variable> = names
            .into_iter()
            .zip(params)
            .map(|(n, ty)| self.register(n, ty.clone()))
            .collect();
        let result = body(self, &args);
        self.scopes.pop();
        self.emit("}".to_string());
        result?;
        let ty = TypeDesc::function(
            params.iter().cloned().map(Param::plain).collect(),
            TypeDesc::undefined(),
        );
        Ok(self.register(name, ty))
    }

    pub fn build_if(
        &mut self,
        cond: Variable,
        body: impl FnOnce(&mut Self) -> FuzzResult<()>,
    ) -> FuzzResult<()> {
        let c = self.expr(cond);
        self.emit(format!("if ({c}) {{"));
        let result = self.block(body);
        self.emit("}".to_string());
        result
    }

    pub fn build_if_else(
        &mut self,
        cond: Variable,
        if_body: impl FnOnce(&mut Self) -> FuzzResult<()>,
        else_body: impl FnOnce(&mut Self) -> FuzzResult<()>,
    ) -> FuzzResult<()> {
        let c = self.expr(cond);
        self.emit(format!("if ({c}) {{"));
        self.block(if_body)?;
        self.emit("} else {".to_string());
        let result = self.block(else_body);
        self.emit("}".to_string());
        result
    }

    /// `try { .. } catch (e) { .. }`; `error_ty` types the caught value.
    pub fn build_try_catch(
        &mut self,
        error_ty: TypeDesc,
        try_body: impl FnOnce(&mut Self) -> FuzzResult<()>,
        catch_body: impl FnOnce(&mut Self, Variable) -> FuzzResult<()>,
    ) -> FuzzResult<()> {
        self.emit("try {".to_string());
        self.block(try_body)?;
        let err_name = self.fresh_name('e');
        self.emit(format!("}} catch ({err_name}) {{"));
        self.scopes.push(Vec::new());
        let err = self.register(err_name, error_ty);
        let result = catch_body(self, err);
        self.scopes.pop();
        self.emit("}".to_string());
        result
    }

    /// `for (let i = 0; i < count; i++) { .. }`
    pub fn build_repeat(
        &mut self,
        count: u32,
        body: impl FnOnce(&mut Self, Variable) -> FuzzResult<()>,
    ) -> FuzzResult<()> {
        let name = self.fresh_name('i');
        self.emit(format!("for (let {name} = 0; {name} < {count}; {name}++) {{"));
        self.scopes.push(Vec::new());
        let counter = self.register(name, TypeDesc::integer());
        let result = body(self, counter);
        self.scopes.pop();
        self.emit("}".to_string());
        result
    }

    fn block(&mut self, body: impl FnOnce(&mut Self) -> FuzzResult<()>) -> FuzzResult<()> {
        self.scopes.push(Vec::new());
        let result = body(self);
        self.scopes.pop();
        result
    }

    // Raw emission for model-independent code.

    /// Bind an arbitrary expression. Callers must only interpolate
    /// expressions obtained from [`Self::expr`] or literal helpers.
    pub(crate) fn bind(&mut self, rhs: String, ty: TypeDesc) -> Variable {
        let name = self.fresh_name('v');
        self.emit(format!("const {name} = {rhs};"));
        self.register(name, ty)
    }

    pub(crate) fn emit_statement(&mut self, statement: String) {
        self.emit(statement);
    }

    /// Source text of `v`. Referencing a value outside its scope is recorded.
    pub(crate) fn expr(&mut self, v: Variable) -> String {
        if !self.is_visible(v) {
            let name = self.peek_expr(v);
            self.violations.push(name);
        }
        self.peek_expr(v)
    }

    fn exprs(&mut self, vars: &[Variable]) -> String {
        vars.iter().map(|v| self.expr(*v)).collect::<Vec<_>>().join(", ")
    }

    fn peek_expr(&self, v: Variable) -> String {
        self.bindings.get(v.0).map(|b| b.expr.clone()).unwrap_or_default()
    }

    pub fn type_of(&self, v: Variable) -> &TypeDesc {
        &self.bindings[v.0].ty
    }

    fn types_of(&self, vars: &[Variable]) -> Vec<TypeDesc> {
        vars.iter().map(|v| self.type_of(*v).clone()).collect()
    }

    pub fn is_visible(&self, v: Variable) -> bool {
        self.scopes.iter().any(|scope| scope.contains(&v))
    }

    /// Visible values whose type satisfies `pred`, innermost last.
    pub fn visible_where(&self, pred: impl Fn(&TypeDesc) -> bool) -> Vec<Variable> {
        self.scopes
            .iter()
            .flatten()
            .copied()
            .filter(|v| pred(self.type_of(*v)))
            .collect()
    }

    /// References made to values outside their scope so far.
    pub fn scope_violations(&self) -> &[String] {
        &self.violations
    }

    pub fn finish(self) -> String {
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }

    fn register(&mut self, expr: String, ty: TypeDesc) -> Variable {
        let v = Variable(self.bindings.len());
        self.bindings.push(Binding { expr, ty });
        if let Some(scope) = self.scopes.last_mut() {
            scope.push(v);
        }
        v
    }

    fn fresh_name(&mut self, prefix: char) -> String {
        let name = format!("{prefix}{}", self.next_name);
        self.next_name += 1;
        name
    }

    fn emit(&mut self, line: String) {
        let depth = self.scopes.len().saturating_sub(1);
        self.lines.push(format!("{}{line}", "    ".repeat(depth)));
    }
}

fn describe(types: &[TypeDesc]) -> String {
    let parts: Vec<String> = types.iter().map(|t| t.to_string()).collect();
    format!("[{}]", parts.join(", "))
}

/// Quote `value` as a JavaScript string literal. Line terminators, quotes,
/// backslashes and control characters are escaped, so arbitrary random text
/// can never break out of the literal.
pub fn js_string_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c == '\u{7f}' || c == '\u{2028}' || c == '\u{2029}' => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{workerd_surface, SeededEntropy};

    #[test]
    fn string_literals_escape_everything_structural() {
        assert_eq!(js_string_literal("plain"), "\"plain\"");
        assert_eq!(js_string_literal("a\"b\\c"), "\"a\\\"b\\\\c\"");
        assert_eq!(js_string_literal("x\ny\u{2028}z\u{0}"), "\"x\\ny\\u2028z\\u0000\"");
        assert_eq!(js_string_literal("<span>é</span>"), "\"<span>é</span>\"");
    }

    #[test]
    fn model_checked_calls_emit_and_type_results() {
        let model = workerd_surface().expect("model");
        let tuning = Tuning::default();
        let mut entropy = SeededEntropy::new(1);
        let mut b = ProgramBuilder::new(&model, &tuning, &mut entropy);

        let ctor = b.named_builtin("HTMLRewriter").expect("builtin");
        let rewriter = b.construct(ctor, &[]).expect("construct");
        assert_eq!(b.type_of(rewriter), &crate::html_rewriter());
        let handler = b.create_object(crate::element_handler(), &[]).expect("handler");
        let selector = b.load_string("div");
        b.call_method(rewriter, "on", &[selector, handler]).expect("on");

        let code = b.finish();
        assert!(code.contains("const v0 = new HTMLRewriter();"), "{code}");
        assert!(code.contains("const v1 = {};"), "{code}");
        assert!(code.contains("const v2 = v0.on(\"div\", v1);"), "{code}");
    }

    #[test]
    fn undeclared_operations_are_generation_errors() {
        let model = workerd_surface().expect("model");
        let tuning = Tuning::default();
        let mut entropy = SeededEntropy::new(1);
        let mut b = ProgramBuilder::new(&model, &tuning, &mut entropy);

        assert!(b.named_builtin("KVNamespace").is_err());
        let ctor = b.named_builtin("HTMLRewriter").expect("builtin");
        let rewriter = b.construct(ctor, &[]).expect("construct");
        let err = b.call_method(rewriter, "explode", &[]).expect_err("undeclared");
        assert!(err.to_string().contains("explode"));

        let n = b.load_int(3);
        let err = b.call_method(rewriter, "transform", &[n]).expect_err("bad args");
        assert!(err.to_string().contains("do not match"));

        let f = b.build_function(&[], |_, _| Ok(())).expect("fn");
        assert!(b.set_property(rewriter, "element", f).is_err());
    }

    #[test]
    fn values_bound_in_a_callback_do_not_leak() {
        let model = workerd_surface().expect("model");
        let tuning = Tuning::default();
        let mut entropy = SeededEntropy::new(1);
        let mut b = ProgramBuilder::new(&model, &tuning, &mut entropy);

        let mut leaked = None;
        b.build_function(&[crate::html_element()], |b, args| {
            let tag = b.get_property(args[0], "tagName")?;
            leaked = Some(tag);
            Ok(())
        })
        .expect("fn");
        assert!(b.scope_violations().is_empty());

        let tag = leaked.expect("bound");
        assert!(!b.is_visible(tag));
        let _ = b.call_method(tag, "toString", &[]).expect("typed call still emits");
        assert_eq!(b.scope_violations().len(), 1);
    }

    #[test]
    fn nested_regions_are_indented() {
        let model = workerd_surface().expect("model");
        let tuning = Tuning::default();
        let mut entropy = SeededEntropy::new(1);
        let mut b = ProgramBuilder::new(&model, &tuning, &mut entropy);

        let t = b.load_bool(true);
        b.build_if(t, |b| {
            b.build_repeat(2, |b, i| {
                let one = b.load_int(1);
                b.compare(i, one, Comparator::LessThan);
                Ok(())
            })
        })
        .expect("regions");
        let code = b.finish();
        let lines: Vec<&str> = code.lines().collect();
        assert_eq!(lines[0], "if (true) {");
        assert!(lines[1].starts_with("    for (let i0 = 0;"));
        assert_eq!(lines[2], "        const v1 = i0 < 1;");
        assert_eq!(lines[3], "    }");
        assert_eq!(lines[4], "}");
    }
}
