//! Scenario assembly: whole programs that exercise the rewriter end to end.
//!
//! The `HTMLRewriterFuzzer` template probes for the builtins it needs, runs
//! the full scenario when they exist and falls back to generic code when they
//! do not. Steps bind their results into a [`ScenarioState`]; a step that asks
//! for a role nobody bound yet is a generation error.

use serde::Serialize;

use crate::{
    build_generic, js_error, CapabilityMode, Comparator, DocumentHandlerPlan, ElementHandlerPlan,
    Entropy, FuzzError, FuzzResult, ProgramBuilder, SurfaceModel, Tuning, TypeDesc, Variable,
    WeightedList,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Payload,
    Headers,
    ResponseInit,
    Response,
    Rewriter,
    Transformed,
}

/// Bindings made by earlier scenario steps, in emission order.
#[derive(Debug, Default)]
pub struct ScenarioState {
    bindings: Vec<(Role, Variable)>,
    handlers: u32,
    follow_ups: Vec<FollowUp>,
}

impl ScenarioState {
    pub fn bind(&mut self, role: Role, value: Variable) {
        self.bindings.push((role, value));
    }

    /// Latest binding for `role`.
    pub fn get(&self, role: Role) -> FuzzResult<Variable> {
        self.bindings
            .iter()
            .rev()
            .find(|(r, _)| *r == role)
            .map(|(_, v)| *v)
            .ok_or_else(|| {
                FuzzError::Generation(format!("{role:?} referenced before it was bound"))
            })
    }

    pub fn roles(&self) -> impl Iterator<Item = Role> + '_ {
        self.bindings.iter().map(|(r, _)| *r)
    }

    pub fn handlers_registered(&self) -> u32 {
        self.handlers
    }

    pub fn follow_ups(&self) -> &[FollowUp] {
        &self.follow_ups
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowUp {
    CloneAndRetransform,
    ReadText,
    ReadArrayBuffer,
}

/// A whole-program generator with a selection weight.
#[derive(Clone, Copy)]
pub struct ProgramTemplate {
    pub name: &'static str,
    pub weight: u32,
    /// Globals the template constructs; all must be declared by the model.
    pub requires: &'static [&'static str],
    run: fn(&mut ProgramBuilder<'_>) -> FuzzResult<()>,
}

impl std::fmt::Debug for ProgramTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgramTemplate")
            .field("name", &self.name)
            .field("weight", &self.weight)
            .field("requires", &self.requires)
            .finish()
    }
}

impl ProgramTemplate {
    /// Fails when the model lacks a builtin the template constructs.
    pub fn check(&self, model: &SurfaceModel) -> FuzzResult<()> {
        match self.requires.iter().find(|name| model.builtin(name).is_none()) {
            Some(builtin) => Err(FuzzError::Config(format!(
                "template {} requires builtin {builtin:?}, which the model does not declare",
                self.name
            ))),
            None => Ok(()),
        }
    }
}

const REWRITER_BUILTINS: &[&str] = &["HTMLRewriter", "Response", "Headers"];

const PROGRAM_TEMPLATES: &[ProgramTemplate] = &[ProgramTemplate {
    name: "HTMLRewriterFuzzer",
    weight: 25,
    requires: REWRITER_BUILTINS,
    run: html_rewriter_fuzzer,
}];

pub fn program_templates() -> &'static [ProgramTemplate] {
    PROGRAM_TEMPLATES
}

pub fn find_template(name: &str) -> Option<&'static ProgramTemplate> {
    PROGRAM_TEMPLATES.iter().find(|t| t.name == name)
}

pub fn pick_template(entropy: &mut dyn Entropy) -> Option<&'static ProgramTemplate> {
    WeightedList::new(PROGRAM_TEMPLATES.iter().map(|t| (t, t.weight)).collect())
        .pick(entropy)
        .copied()
}

/// Run one template to completion and return the program text.
pub fn generate_program(
    model: &SurfaceModel,
    tuning: &Tuning,
    template: &ProgramTemplate,
    entropy: &mut dyn Entropy,
) -> FuzzResult<String> {
    tuning.validate()?;
    template.check(model)?;

    let mut b = ProgramBuilder::new(model, tuning, entropy);
    (template.run)(&mut b)?;
    if let Some(name) = b.scope_violations().first() {
        return Err(FuzzError::Generation(format!(
            "template {} referenced {name} outside its scope",
            template.name
        )));
    }
    let code = b.finish();
    tracing::debug!(template = template.name, lines = code.lines().count(), "generated program");
    Ok(code)
}

const HTML_FIXTURES: &[&str] = &[
    r#"<!DOCTYPE html>
<html lang="en">
    <head>
        <title>Example</title>
    </head>
    <body>
        <section data-block="one">
            <h1>Heading</h1>
            <p>Sample paragraph.</p>
            <a href="https://example.com">Link</a>
        </section>
        <!-- Marker -->
    </body>
</html>"#,
    r#"<article>
    <header>
        <h2>Article Title</h2>
    </header>
    <div class="content">
        <p>First paragraph.</p>
        <p>Second paragraph with <strong>emphasis</strong>.</p>
    </div>
    <footer>Footer content</footer>
</article>"#,
    r#"<div id="wrapper">
    <ul class="items">
        <li data-index="1">One</li>
        <li data-index="2">Two</li>
        <li data-index="3">Three</li>
    </ul>
    <template id="template">
        <span data-template="yes"></span>
    </template>
</div>"#,
];

const EXTRA_HEADER_NAMES: &[&str] = &["x-meta", "x-fuzz", "cache-control", "x-trace-id", "vary"];
const EXTRA_HEADER_VALUES: &[&str] = &["1", "no-cache", "max-age=0", "text/html", "abc123", ""];
const STATUS_TEXTS: &[&str] = &["OK", "Created", "Not Found", "I'm a teapot", ""];
// Statuses that forbid a body make the `Response` constructor throw.
const NULL_BODY_STATUSES: &[i64] = &[204, 205, 304];

fn html_rewriter_fuzzer(b: &mut ProgramBuilder<'_>) -> FuzzResult<()> {
    let tuning = b.tuning();
    build_generic(b, tuning.prefix_filler)?;

    match tuning.capability {
        CapabilityMode::Probe => {
            let available = capability_probe(b, REWRITER_BUILTINS)?;
            b.build_if_else(
                available,
                |b| {
                    full_scenario(b)?;
                    let n = tuning.inner_filler.draw(b.entropy());
                    build_generic(b, n)
                },
                |b| build_generic(b, tuning.fallback_filler),
            )?;
        }
        CapabilityMode::AssumePresent => {
            full_scenario(b)?;
            let n = tuning.inner_filler.draw(b.entropy());
            build_generic(b, n)?;
        }
        CapabilityMode::AssumeAbsent => build_generic(b, tuning.fallback_filler)?,
    }

    build_generic(b, tuning.trailing_filler)
}

/// `typeof X !== "undefined"` for every builtin, joined with `&&`.
pub fn capability_probe(b: &mut ProgramBuilder<'_>, builtins: &[&str]) -> FuzzResult<Variable> {
    let mut combined: Option<Variable> = None;
    for name in builtins {
        let ty = b.eval_typeof(name)?;
        let undefined = b.load_string("undefined");
        let present = b.compare(ty, undefined, Comparator::StrictNotEqual);
        combined = Some(match combined {
            Some(acc) => b.logical_and(acc, present),
            None => present,
        });
    }
    combined.ok_or_else(|| {
        FuzzError::Generation("capability probe needs at least one builtin".to_string())
    })
}

/// Steps 1 to 7 of the rewriter scenario.
pub fn full_scenario(b: &mut ProgramBuilder<'_>) -> FuzzResult<ScenarioState> {
    let tuning = b.tuning();
    let mut state = ScenarioState::default();

    let fixture = *b.choose(HTML_FIXTURES);
    let payload = b.named_string(fixture);
    state.bind(Role::Payload, payload);

    let headers_ctor = b.named_builtin("Headers")?;
    let headers = b.construct(headers_ctor, &[])?;
    let name = b.load_string("content-type");
    let value = b.load_string("text/html");
    b.call_method(headers, "set", &[name, value])?;
    for _ in 0..2 {
        if b.probability(tuning.extra_header) {
            let name = *b.choose(EXTRA_HEADER_NAMES);
            let value = *b.choose(EXTRA_HEADER_VALUES);
            let (name, value) = (b.load_string(name), b.load_string(value));
            b.call_method(headers, "append", &[name, value])?;
        }
    }
    state.bind(Role::Headers, headers);

    let mut init = vec![("headers", state.get(Role::Headers)?)];
    if b.probability(tuning.response_status) {
        let mut status = b.range(200, 599);
        if NULL_BODY_STATUSES.contains(&status) {
            status = 200;
        }
        init.push(("status", b.load_int(status)));
    }
    if b.probability(tuning.response_status_text) {
        let text = *b.choose(STATUS_TEXTS);
        init.push(("statusText", b.load_string(text)));
    }
    let init = b.create_object(crate::response_init(), &init)?;
    state.bind(Role::ResponseInit, init);

    let response_ctor = b.named_builtin("Response")?;
    let response = b.construct(
        response_ctor,
        &[state.get(Role::Payload)?, state.get(Role::ResponseInit)?],
    )?;
    state.bind(Role::Response, response);

    let rewriter_ctor = b.named_builtin("HTMLRewriter")?;
    let rewriter = b.construct(rewriter_ctor, &[])?;
    state.bind(Role::Rewriter, rewriter);

    let count = tuning.handler_count.draw(b.entropy());
    for _ in 0..count {
        let plan = ElementHandlerPlan::draw(b.entropy(), tuning);
        let handler = plan.emit(b)?;
        let pattern = b.choose(&tuning.selector_pool).clone();
        let selector = b.load_string(&pattern);
        b.call_method(state.get(Role::Rewriter)?, "on", &[selector, handler])?;
        state.handlers += 1;
    }

    if b.probability(tuning.document_handler) {
        let plan = DocumentHandlerPlan::draw(b.entropy(), tuning);
        let handler = plan.emit(b)?;
        b.call_method(state.get(Role::Rewriter)?, "onDocument", &[handler])?;
    }

    b.build_try_catch(
        js_error(),
        |b| {
            let response = state.get(Role::Response)?;
            let transformed =
                b.call_method(state.get(Role::Rewriter)?, "transform", &[response])?;
            state.bind(Role::Transformed, transformed);
            follow_ups(b, &mut state)
        },
        |b, err| {
            b.call_method(err, "toString", &[])?;
            Ok(())
        },
    )?;

    tracing::debug!(
        handlers = state.handlers,
        follow_ups = state.follow_ups.len(),
        "assembled rewriter scenario"
    );
    Ok(state)
}

/// Every chain has its own gate; at most `max_follow_ups` of the hits run.
fn follow_ups(b: &mut ProgramBuilder<'_>, state: &mut ScenarioState) -> FuzzResult<()> {
    let tuning = b.tuning();
    let gates = [
        (FollowUp::CloneAndRetransform, tuning.clone_retransform),
        (FollowUp::ReadText, tuning.read_text),
        (FollowUp::ReadArrayBuffer, tuning.read_array_buffer),
    ];
    for (kind, p) in gates {
        if !b.probability(p) {
            continue;
        }
        if state.follow_ups.len() >= tuning.max_follow_ups as usize {
            break;
        }
        let transformed = state.get(Role::Transformed)?;
        match kind {
            FollowUp::CloneAndRetransform => {
                let cloned = b.call_method(transformed, "clone", &[])?;
                b.call_method(state.get(Role::Rewriter)?, "transform", &[cloned])?;
            }
            FollowUp::ReadText => {
                let promise = b.call_method(transformed, "text", &[])?;
                if b.probability(tuning.text_preview) {
                    let end = b.range(0, i64::from(tuning.preview_slice_max));
                    let preview = b.build_function(&[TypeDesc::string()], |b, args| {
                        let (start, end) = (b.load_int(0), b.load_int(end));
                        let slice = b.call_method(args[0], "slice", &[start, end])?;
                        b.call_method(slice, "toString", &[])?;
                        Ok(())
                    })?;
                    b.call_method(promise, "then", &[preview])?;
                }
            }
            FollowUp::ReadArrayBuffer => {
                let promise = b.call_method(transformed, "arrayBuffer", &[])?;
                if b.probability(tuning.buffer_catch) {
                    let handler = b.build_function(&[js_error()], |b, args| {
                        b.call_method(args[0], "toString", &[])?;
                        Ok(())
                    })?;
                    b.call_method(promise, "catch", &[handler])?;
                }
            }
        }
        state.follow_ups.push(kind);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{workerd_surface, CountRange, GroupOrigin, ReplayEntropy, SeededEntropy};

    fn template() -> &'static ProgramTemplate {
        find_template("HTMLRewriterFuzzer").expect("template")
    }

    fn generate(tuning: &Tuning, seed: u64) -> String {
        let model = workerd_surface().expect("model");
        let mut entropy = SeededEntropy::new(seed);
        generate_program(&model, tuning, template(), &mut entropy).expect("generate")
    }

    fn first_binding(line: &str) -> &str {
        line.trim().trim_start_matches("const ").split(' ').next().expect("name")
    }

    #[test]
    fn forced_handler_count_registers_that_many_handlers() {
        let mut tuning = Tuning::default();
        tuning.capability = CapabilityMode::AssumePresent;
        tuning.handler_count = CountRange::fixed(2);
        tuning.selector_pool = vec!["div.only".to_string()];
        tuning.document_handler = 0.0;
        for seed in 0..16 {
            let code = generate(&tuning, seed);
            assert_eq!(code.matches(".on(\"div.only\", ").count(), 2, "seed {seed}:\n{code}");
            assert_eq!(code.matches(".on(").count(), 2, "seed {seed}:\n{code}");
        }
    }

    #[test]
    fn forced_clone_retransforms_the_clone_on_the_same_rewriter() {
        let mut tuning = Tuning::default();
        tuning.capability = CapabilityMode::AssumePresent;
        tuning.clone_retransform = 1.0;
        tuning.read_text = 0.0;
        tuning.read_array_buffer = 0.0;
        let code = generate(&tuning, 7);

        let clone_line = code.lines().find(|l| l.contains(".clone()")).expect("clone emitted");
        let cloned = first_binding(clone_line);
        let rewriter_line = code
            .lines()
            .find(|l| l.contains("= new HTMLRewriter()"))
            .expect("rewriter constructed");
        let rewriter = first_binding(rewriter_line);
        let retransform = format!("{rewriter}.transform({cloned})");
        assert!(code.contains(&retransform), "missing {retransform}:\n{code}");
        assert_eq!(code.matches(&format!("{rewriter}.transform(")).count(), 2, "{code}");
    }

    #[test]
    fn absent_capability_emits_only_generic_code() {
        let model = workerd_surface().expect("model");
        let mut tuning = Tuning::default();
        tuning.capability = CapabilityMode::AssumeAbsent;
        let names = model.method_names(GroupOrigin::Surface);
        for seed in 0..16 {
            let code = generate(&tuning, seed);
            assert!(!code.trim().is_empty());
            for name in &names {
                assert!(!code.contains(&format!(".{name}(")), "seed {seed} emitted .{name}(");
            }
            for builtin in REWRITER_BUILTINS {
                assert!(!code.contains(builtin), "seed {seed} mentions {builtin}");
            }
        }
    }

    #[test]
    fn probe_covers_every_builtin_and_guards_the_scenario() {
        let code = generate(&Tuning::default(), 3);
        for builtin in REWRITER_BUILTINS {
            assert!(code.contains(&format!("typeof {builtin};")), "{code}");
        }
        assert!(code.contains(" !== \"undefined\";"));
        assert!(code.contains(" && "));
        assert!(code.contains("} else {"));
        let probe = code.find("typeof HTMLRewriter").expect("probe");
        let construct = code.find("new HTMLRewriter()").expect("construct");
        assert!(probe < construct);
    }

    #[test]
    fn same_seed_same_program_and_replay_matches() {
        let model = workerd_surface().expect("model");
        let tuning = Tuning::default();
        for seed in [0, 1, 42, u64::MAX] {
            let mut first = SeededEntropy::new(seed);
            let a = generate_program(&model, &tuning, template(), &mut first).expect("a");
            let mut second = SeededEntropy::new(seed);
            let b = generate_program(&model, &tuning, template(), &mut second).expect("b");
            assert_eq!(a, b);

            let log = first.into_log();
            let mut replay = ReplayEntropy::new(&log);
            let c = generate_program(&model, &tuning, template(), &mut replay).expect("c");
            assert_eq!(a, c);
            assert_eq!(replay.divergences(), 0);
        }
    }

    #[test]
    fn emitted_surface_calls_are_declared() {
        let model = workerd_surface().expect("model");
        let mut tuning = Tuning::default();
        tuning.prefix_filler = 0;
        tuning.inner_filler = CountRange::fixed(0);
        tuning.fallback_filler = 0;
        tuning.trailing_filler = 0;
        let declared: std::collections::BTreeSet<&str> = model
            .groups()
            .flat_map(|g| g.methods.keys())
            .map(String::as_str)
            .collect();
        for seed in 0..64 {
            let code = generate(&tuning, seed);
            for (idx, _) in code.match_indices('.') {
                let rest = &code[idx + 1..];
                let ident: String =
                    rest.chars().take_while(|c| c.is_ascii_alphanumeric()).collect();
                if ident.is_empty() || !rest[ident.len()..].starts_with('(') {
                    continue;
                }
                assert!(
                    declared.contains(ident.as_str()),
                    "seed {seed}: undeclared .{ident}(\n{code}"
                );
            }
        }
    }

    #[test]
    fn follow_ups_never_exceed_the_cap() {
        let model = workerd_surface().expect("model");
        let mut tuning = Tuning::default();
        tuning.clone_retransform = 1.0;
        tuning.read_text = 1.0;
        tuning.read_array_buffer = 1.0;
        tuning.capability = CapabilityMode::AssumePresent;
        let mut entropy = SeededEntropy::new(9);
        let mut b = ProgramBuilder::new(&model, &tuning, &mut entropy);
        let state = full_scenario(&mut b).expect("scenario");
        assert_eq!(
            state.follow_ups(),
            &[FollowUp::CloneAndRetransform, FollowUp::ReadText]
        );
        let roles: Vec<Role> = state.roles().collect();
        assert_eq!(
            roles,
            vec![
                Role::Payload,
                Role::Headers,
                Role::ResponseInit,
                Role::Response,
                Role::Rewriter,
                Role::Transformed
            ]
        );
        assert!((1..=4).contains(&state.handlers_registered()));
    }

    #[test]
    fn unbound_roles_are_errors() {
        let state = ScenarioState::default();
        let err = state.get(Role::Transformed).expect_err("unbound");
        assert!(err.to_string().contains("Transformed"));
    }

    #[test]
    fn templates_require_declared_builtins() {
        let groups = crate::surface_groups().into_iter().chain(crate::host_groups());
        let model = crate::SurfaceModel::new(groups, []).expect("model without builtins");
        let err = template().check(&model).expect_err("must fail");
        assert!(matches!(err, FuzzError::Config(_)), "{err}");
        assert!(err.to_string().contains("HTMLRewriter"));

        let mut entropy = SeededEntropy::new(1);
        let err = generate_program(&model, &Tuning::default(), template(), &mut entropy)
            .expect_err("must fail");
        assert!(err.to_string().contains("HTMLRewriter"));
        assert!(entropy.log().draws.is_empty());

        let full = crate::workerd_surface().expect("model");
        assert!(program_templates().iter().all(|t| t.check(&full).is_ok()));
    }

    #[test]
    fn template_picks_follow_weights() {
        let mut entropy = SeededEntropy::new(4);
        for _ in 0..8 {
            assert_eq!(pick_template(&mut entropy).map(|t| t.name), Some("HTMLRewriterFuzzer"));
        }
    }
}
