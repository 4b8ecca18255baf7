//! Snippet builders for the HTMLRewriter surface.
//!
//! Handler objects are drawn as plain data first (`*Plan::draw`) and emitted
//! second (`*Plan::emit`). Drawing uses two independent stages: a Bernoulli
//! gate per optional slot decides presence, then a uniform pick decides the
//! variant. Adding a variant never changes how often a slot is present.

use serde::Serialize;

use crate::{
    content_options, document_handler, element_handler, html_comment, html_doctype,
    html_document_end, html_element, html_end_tag, html_rewriter, html_text_chunk, response,
    Entropy, FuzzError, FuzzResult, ProgramBuilder, SurfaceModel, Tuning, TypeDesc, Variable,
    WeightedList,
};

/// An optional handler slot: either absent or present with its payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "action", rename_all = "snake_case")]
pub enum Slot<T> {
    Absent,
    Present(T),
}

impl<T> Slot<T> {
    /// Presence gate with probability `p`; `variant` only runs when present.
    pub fn draw(
        entropy: &mut dyn Entropy,
        p: f64,
        variant: impl FnOnce(&mut dyn Entropy) -> T,
    ) -> Self {
        if entropy.bernoulli(p) {
            Self::Present(variant(entropy))
        } else {
            Self::Absent
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }

    pub fn as_option(&self) -> Option<&T> {
        match self {
            Self::Present(v) => Some(v),
            Self::Absent => None,
        }
    }
}

const ATTRIBUTE_NAMES: &[&str] = &["class", "id", "href", "src", "data-tag"];
const DOCUMENT_END_MARKERS: &[&str] = &["<!-- Processed -->", "<!-- Preface -->", "<!-- Tail -->"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertPosition {
    Append,
    Prepend,
    Before,
    After,
}

impl InsertPosition {
    const ALL: [Self; 4] = [Self::Append, Self::Prepend, Self::Before, Self::After];

    fn method(self) -> &'static str {
        match self {
            Self::Append => "append",
            Self::Prepend => "prepend",
            Self::Before => "before",
            Self::After => "after",
        }
    }
}

/// Markup inserted by a content mutation, with optional `{ html }` options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Content {
    pub markup: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<bool>,
}

impl Content {
    fn draw(entropy: &mut dyn Entropy, tuning: &Tuning, markup: String) -> Self {
        let html = if entropy.bernoulli(tuning.content_options) {
            Some(entropy.bernoulli(0.5))
        } else {
            None
        };
        Self { markup, html }
    }

    fn args(&self, b: &mut ProgramBuilder<'_>) -> FuzzResult<Vec<Variable>> {
        let markup = b.load_string(&self.markup);
        let mut args = vec![markup];
        if let Some(html) = self.html {
            let flag = b.load_bool(html);
            args.push(b.create_object(content_options(), &[("html", flag)])?);
        }
        Ok(args)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EndTagAction {
    Before { content: Content },
    After { content: Content },
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ElementAction {
    /// `hasAttribute` guard, copy the value back, maybe overwrite it.
    Attribute {
        name: &'static str,
        overwrite: Option<String>,
    },
    Insert {
        position: InsertPosition,
        content: Content,
    },
    SetInnerContent {
        content: Content,
    },
    Remove,
    RemoveAndKeepContent,
    OnEndTag {
        action: EndTagAction,
    },
}

impl ElementAction {
    const VARIANTS: usize = 6;

    pub fn draw(entropy: &mut dyn Entropy, tuning: &Tuning) -> Self {
        match entropy.index(Self::VARIANTS) {
            0 => {
                let name = ATTRIBUTE_NAMES[entropy.index(ATTRIBUTE_NAMES.len())];
                let overwrite = if entropy.bernoulli(tuning.attribute_overwrite) {
                    Some(entropy.text())
                } else {
                    None
                };
                Self::Attribute { name, overwrite }
            }
            1 => {
                let position = InsertPosition::ALL[entropy.index(InsertPosition::ALL.len())];
                let markup = format!("<span>{}</span>", entropy.text());
                Self::Insert {
                    position,
                    content: Content::draw(entropy, tuning, markup),
                }
            }
            2 => {
                let markup = format!("<em>{}</em>", entropy.text());
                Self::SetInnerContent {
                    content: Content::draw(entropy, tuning, markup),
                }
            }
            3 => Self::Remove,
            4 => Self::RemoveAndKeepContent,
            _ => {
                let action = match entropy.index(3) {
                    0 => {
                        let markup = format!("<i>{}</i>", entropy.text());
                        EndTagAction::Before {
                            content: Content::draw(entropy, tuning, markup),
                        }
                    }
                    1 => {
                        let markup = format!("<i>{}</i>", entropy.text());
                        EndTagAction::After {
                            content: Content::draw(entropy, tuning, markup),
                        }
                    }
                    _ => EndTagAction::Remove,
                };
                Self::OnEndTag { action }
            }
        }
    }

    fn emit(&self, b: &mut ProgramBuilder<'_>, element: Variable) -> FuzzResult<()> {
        match self {
            Self::Attribute { name, overwrite } => {
                let attr = b.load_string(name);
                let has = b.call_method(element, "hasAttribute", &[attr])?;
                b.build_if(has, |b| {
                    let value = b.call_method(element, "getAttribute", &[attr])?;
                    b.call_method(element, "setAttribute", &[attr, value])?;
                    Ok(())
                })?;
                if let Some(text) = overwrite {
                    let value = b.load_string(text);
                    b.call_method(element, "setAttribute", &[attr, value])?;
                }
            }
            Self::Insert { position, content } => {
                let args = content.args(b)?;
                b.call_method(element, position.method(), &args)?;
            }
            Self::SetInnerContent { content } => {
                let args = content.args(b)?;
                b.call_method(element, "setInnerContent", &args)?;
            }
            Self::Remove => {
                b.call_method(element, "remove", &[])?;
            }
            Self::RemoveAndKeepContent => {
                b.call_method(element, "removeAndKeepContent", &[])?;
            }
            Self::OnEndTag { action } => {
                let f = b.build_function(&[html_end_tag()], |b, args| {
                    let end = args[0];
                    match action {
                        EndTagAction::Before { content } => {
                            let args = content.args(b)?;
                            b.call_method(end, "before", &args)?;
                        }
                        EndTagAction::After { content } => {
                            let args = content.args(b)?;
                            b.call_method(end, "after", &args)?;
                        }
                        EndTagAction::Remove => {
                            b.call_method(end, "remove", &[])?;
                        }
                    }
                    Ok(())
                })?;
                b.call_method(element, "onEndTag", &[f])?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommentAction {
    Remove,
    Replace { text: String },
}

impl CommentAction {
    pub fn draw(entropy: &mut dyn Entropy) -> Self {
        match entropy.index(2) {
            0 => Self::Remove,
            _ => Self::Replace { text: entropy.text() },
        }
    }

    fn emit(&self, b: &mut ProgramBuilder<'_>, comment: Variable) -> FuzzResult<()> {
        match self {
            Self::Remove => b.call_method(comment, "remove", &[])?,
            Self::Replace { text } => {
                let s = b.load_string(text);
                b.call_method(comment, "replace", &[s])?
            }
        };
        Ok(())
    }
}

/// Text chunk callback: replace the chunk with a prefix of its own text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextAction {
    pub slice_end: u32,
}

impl TextAction {
    pub fn draw(entropy: &mut dyn Entropy, tuning: &Tuning) -> Self {
        Self {
            slice_end: entropy.range(0, i64::from(tuning.text_slice_max)) as u32,
        }
    }

    fn emit(&self, b: &mut ProgramBuilder<'_>, chunk: Variable) -> FuzzResult<()> {
        let text = b.get_property(chunk, "text")?;
        let start = b.load_int(0);
        let end = b.load_int(i64::from(self.slice_end));
        let slice = b.call_method(text, "slice", &[start, end])?;
        b.call_method(chunk, "replace", &[slice])?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DoctypeField {
    Name,
    PublicId,
    SystemId,
}

impl DoctypeField {
    const ALL: [Self; 3] = [Self::Name, Self::PublicId, Self::SystemId];

    fn property(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::PublicId => "publicId",
            Self::SystemId => "systemId",
        }
    }
}

/// Document end callback: append one of the fixed markers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndAction {
    pub content: Content,
}

impl EndAction {
    pub fn draw(entropy: &mut dyn Entropy, tuning: &Tuning) -> Self {
        let marker = DOCUMENT_END_MARKERS[entropy.index(DOCUMENT_END_MARKERS.len())];
        Self {
            content: Content::draw(entropy, tuning, marker.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElementHandlerPlan {
    pub element: Slot<ElementAction>,
    pub comments: Slot<CommentAction>,
    pub text: Slot<TextAction>,
}

impl ElementHandlerPlan {
    pub fn draw(entropy: &mut dyn Entropy, tuning: &Tuning) -> Self {
        Self {
            element: Slot::draw(entropy, tuning.element_slot, |e| ElementAction::draw(e, tuning)),
            comments: Slot::draw(entropy, tuning.comments_slot, CommentAction::draw),
            text: Slot::draw(entropy, tuning.text_slot, |e| TextAction::draw(e, tuning)),
        }
    }

    pub fn populated(&self) -> usize {
        [self.element.is_present(), self.comments.is_present(), self.text.is_present()]
            .into_iter()
            .filter(|p| *p)
            .count()
    }

    /// Emit the callbacks followed by the handler object literal.
    pub fn emit(&self, b: &mut ProgramBuilder<'_>) -> FuzzResult<Variable> {
        let mut slots = Vec::new();
        if let Some(action) = self.element.as_option() {
            let f = b.build_function(&[html_element()], |b, args| action.emit(b, args[0]))?;
            slots.push(("element", f));
        }
        if let Some(action) = self.comments.as_option() {
            let f = b.build_function(&[html_comment()], |b, args| action.emit(b, args[0]))?;
            slots.push(("comments", f));
        }
        if let Some(action) = self.text.as_option() {
            let f = b.build_function(&[html_text_chunk()], |b, args| action.emit(b, args[0]))?;
            slots.push(("text", f));
        }
        b.create_object(element_handler(), &slots)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentHandlerPlan {
    pub doctype: Slot<DoctypeField>,
    pub comments: Slot<CommentAction>,
    pub text: Slot<TextAction>,
    pub end: Slot<EndAction>,
}

impl DocumentHandlerPlan {
    pub fn draw(entropy: &mut dyn Entropy, tuning: &Tuning) -> Self {
        Self {
            doctype: Slot::draw(entropy, tuning.document_doctype_slot, |e| {
                DoctypeField::ALL[e.index(DoctypeField::ALL.len())]
            }),
            comments: Slot::draw(entropy, tuning.document_comments_slot, CommentAction::draw),
            text: Slot::draw(entropy, tuning.document_text_slot, |e| TextAction::draw(e, tuning)),
            end: Slot::draw(entropy, tuning.document_end_slot, |e| EndAction::draw(e, tuning)),
        }
    }

    pub fn populated(&self) -> usize {
        [
            self.doctype.is_present(),
            self.comments.is_present(),
            self.text.is_present(),
            self.end.is_present(),
        ]
        .into_iter()
        .filter(|p| *p)
        .count()
    }

    pub fn emit(&self, b: &mut ProgramBuilder<'_>) -> FuzzResult<Variable> {
        let mut slots = Vec::new();
        if let Some(field) = self.doctype.as_option() {
            let f = b.build_function(&[html_doctype()], |b, args| {
                b.get_property(args[0], field.property())?;
                Ok(())
            })?;
            slots.push(("doctype", f));
        }
        if let Some(action) = self.comments.as_option() {
            let f = b.build_function(&[html_comment()], |b, args| action.emit(b, args[0]))?;
            slots.push(("comments", f));
        }
        if let Some(action) = self.text.as_option() {
            let f = b.build_function(&[html_text_chunk()], |b, args| action.emit(b, args[0]))?;
            slots.push(("text", f));
        }
        if let Some(action) = self.end.as_option() {
            let f = b.build_function(&[html_document_end()], |b, args| {
                let content = action.content.args(b)?;
                b.call_method(args[0], "append", &content)?;
                Ok(())
            })?;
            slots.push(("end", f));
        }
        b.create_object(document_handler(), &slots)
    }
}

// Code generator catalog.

/// A standalone snippet builder, tagged with the group of the value it
/// returns. `uses` lists every `(group, member)` the builder touches and
/// `builtins` every global it constructs.
#[derive(Clone, Copy)]
pub struct CodeGenerator {
    pub name: &'static str,
    pub weight: u32,
    pub produces: &'static str,
    pub uses: &'static [(&'static str, &'static str)],
    pub builtins: &'static [&'static str],
    run: fn(&mut ProgramBuilder<'_>) -> FuzzResult<Variable>,
}

impl std::fmt::Debug for CodeGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeGenerator")
            .field("name", &self.name)
            .field("weight", &self.weight)
            .field("produces", &self.produces)
            .finish()
    }
}

impl CodeGenerator {
    pub fn run(&self, b: &mut ProgramBuilder<'_>) -> FuzzResult<Variable> {
        (self.run)(b)
    }
}

const SET_ATTRIBUTE_HANDLER: &[(&str, &str)] = &[
    ("HTMLRewriter", "on"),
    ("ElementHandler", "element"),
    ("HTMLElement", "setAttribute"),
];

const CODE_GENERATORS: &[CodeGenerator] = &[
    CodeGenerator {
        name: "HTMLRewriterConstructorGenerator",
        weight: 10,
        produces: "HTMLRewriter",
        uses: SET_ATTRIBUTE_HANDLER,
        builtins: &["HTMLRewriter"],
        run: rewriter_constructor,
    },
    CodeGenerator {
        name: "ElementHandlerGenerator",
        weight: 15,
        produces: "ElementHandler",
        uses: &[
            ("ElementHandler", "element"),
            ("ElementHandler", "comments"),
            ("ElementHandler", "text"),
            ("HTMLElement", "hasAttribute"),
            ("HTMLElement", "getAttribute"),
            ("HTMLElement", "setAttribute"),
            ("HTMLElement", "append"),
            ("HTMLElement", "prepend"),
            ("HTMLElement", "before"),
            ("HTMLElement", "after"),
            ("HTMLElement", "setInnerContent"),
            ("HTMLElement", "remove"),
            ("HTMLElement", "removeAndKeepContent"),
            ("HTMLElement", "onEndTag"),
            ("HTMLEndTag", "before"),
            ("HTMLEndTag", "after"),
            ("HTMLEndTag", "remove"),
            ("HTMLComment", "remove"),
            ("HTMLComment", "replace"),
            ("HTMLTextChunk", "text"),
            ("HTMLTextChunk", "replace"),
            ("String", "slice"),
            ("ContentOptions", "html"),
        ],
        builtins: &[],
        run: element_handler_snippet,
    },
    CodeGenerator {
        name: "HTMLRewriterTransformGenerator",
        weight: 10,
        produces: "Response",
        uses: &[
            ("HTMLRewriter", "on"),
            ("HTMLRewriter", "transform"),
            ("ElementHandler", "element"),
            ("HTMLElement", "setAttribute"),
        ],
        builtins: &["HTMLRewriter", "Response"],
        run: rewriter_transform,
    },
    CodeGenerator {
        name: "SelectorMatchingGenerator",
        weight: 10,
        produces: "HTMLRewriter",
        uses: SET_ATTRIBUTE_HANDLER,
        builtins: &["HTMLRewriter"],
        run: selector_matching,
    },
];

const CONSTRUCTOR_SELECTORS: &[&str] = &["div", "p", "a", "*"];
const TRANSFORM_SELECTORS: &[&str] = &["div", "p", "a", "*", "[class]"];
const MATCHING_SELECTORS: &[&str] = &[
    "div",
    "p",
    ".class",
    "#id",
    "[attr]",
    "div > p",
    "div p",
    "div + p",
    "[href^='http']",
    "[class~='test']",
    "p:first-child",
    "*",
];
const TRANSFORM_FIXTURE: &str = "<html><body><div>Test</div></body></html>";

/// The builder catalog, checked against a model.
#[derive(Debug, Clone)]
pub struct GeneratorCatalog {
    generators: Vec<CodeGenerator>,
}

impl GeneratorCatalog {
    /// Fails when a generator touches a group member or constructs a builtin
    /// the model does not declare.
    pub fn new(model: &SurfaceModel) -> FuzzResult<Self> {
        for generator in CODE_GENERATORS {
            if let Some(builtin) = generator.builtins.iter().find(|b| model.builtin(b).is_none()) {
                return Err(FuzzError::Config(format!(
                    "generator {} constructs builtin {builtin:?}, which the model does not declare",
                    generator.name
                )));
            }
            if model.group(generator.produces).is_none() {
                return Err(FuzzError::Config(format!(
                    "generator {} produces undeclared group {:?}",
                    generator.name, generator.produces
                )));
            }
            for (group, member) in generator.uses {
                let declared = model
                    .group(group)
                    .map(|g| g.methods.contains_key(*member) || g.properties.contains_key(*member))
                    .unwrap_or(false);
                if !declared {
                    return Err(FuzzError::Config(format!(
                        "generator {} uses {group}.{member}, which the model does not declare",
                        generator.name
                    )));
                }
            }
        }
        Ok(Self {
            generators: CODE_GENERATORS.to_vec(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &CodeGenerator> {
        self.generators.iter()
    }

    pub fn find(&self, name: &str) -> Option<&CodeGenerator> {
        self.generators.iter().find(|g| g.name == name)
    }

    /// Generators whose result is a value of `group`.
    pub fn producing(&self, group: &str) -> Vec<&CodeGenerator> {
        self.generators.iter().filter(|g| g.produces == group).collect()
    }

    pub fn pick(&self, entropy: &mut dyn Entropy) -> Option<&CodeGenerator> {
        WeightedList::new(self.generators.iter().map(|g| (g, g.weight)).collect())
            .pick(entropy)
            .copied()
    }
}

fn new_rewriter(b: &mut ProgramBuilder<'_>) -> FuzzResult<Variable> {
    let ctor = b.named_builtin("HTMLRewriter")?;
    b.construct(ctor, &[])
}

/// `rewriter.on(selector, { element(el) { el.setAttribute(name, value) } })`
fn register_set_attribute(
    b: &mut ProgramBuilder<'_>,
    rewriter: Variable,
    selector: &str,
    name: &str,
    value: Option<&str>,
) -> FuzzResult<()> {
    let sel = b.load_string(selector);
    let attr = b.load_string(name);
    let val = match value {
        Some(v) => b.load_string(v),
        None => sel,
    };
    let f = b.build_function(&[html_element()], |b, args| {
        b.call_method(args[0], "setAttribute", &[attr, val])?;
        Ok(())
    })?;
    let handler = b.create_object(element_handler(), &[("element", f)])?;
    b.call_method(rewriter, "on", &[sel, handler])?;
    Ok(())
}

fn rewriter_constructor(b: &mut ProgramBuilder<'_>) -> FuzzResult<Variable> {
    let rewriter = new_rewriter(b)?;
    let selector = *b.choose(CONSTRUCTOR_SELECTORS);
    register_set_attribute(b, rewriter, selector, "data-rewritten", Some("true"))?;
    Ok(rewriter)
}

fn element_handler_snippet(b: &mut ProgramBuilder<'_>) -> FuzzResult<Variable> {
    let tuning = b.tuning();
    let plan = ElementHandlerPlan::draw(b.entropy(), tuning);
    plan.emit(b)
}

fn rewriter_transform(b: &mut ProgramBuilder<'_>) -> FuzzResult<Variable> {
    let ctor = b.named_builtin("Response")?;
    let body = b.load_string(TRANSFORM_FIXTURE);
    let input = b.construct(ctor, &[body])?;
    let rewriter = new_rewriter(b)?;
    for _ in 0..b.range(1, 3) {
        let selector = *b.choose(TRANSFORM_SELECTORS);
        register_set_attribute(b, rewriter, selector, "data-processed", Some("true"))?;
    }
    b.call_method(rewriter, "transform", &[input])
}

fn selector_matching(b: &mut ProgramBuilder<'_>) -> FuzzResult<Variable> {
    let rewriter = new_rewriter(b)?;
    for _ in 0..b.range(2, 4) {
        let selector = *b.choose(MATCHING_SELECTORS);
        register_set_attribute(b, rewriter, selector, "data-selector", None)?;
    }
    Ok(rewriter)
}

/// Type of the value a catalog entry produces.
pub fn produced_type(generator: &CodeGenerator) -> Option<TypeDesc> {
    match generator.produces {
        "HTMLRewriter" => Some(html_rewriter()),
        "ElementHandler" => Some(element_handler()),
        "Response" => Some(response()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{workerd_surface, ObjectGroup, SeededEntropy, SurfaceModel};

    #[test]
    fn empty_handler_rate_matches_independent_gates() {
        let tuning = Tuning::default();
        let mut entropy = SeededEntropy::new(0x5eed);
        let n = 4000;
        let empty = (0..n)
            .filter(|_| ElementHandlerPlan::draw(&mut entropy, &tuning).populated() == 0)
            .count();
        let expected =
            (1.0 - tuning.element_slot) * (1.0 - tuning.comments_slot) * (1.0 - tuning.text_slot);
        let observed = empty as f64 / n as f64;
        assert!(
            (observed - expected).abs() < 0.02,
            "observed {observed}, expected {expected}"
        );
    }

    #[test]
    fn presence_rate_does_not_depend_on_variant_count() {
        let tuning = Tuning::default();
        let mut entropy = SeededEntropy::new(17);
        let n = 4000;
        let present = (0..n)
            .filter(|_| ElementHandlerPlan::draw(&mut entropy, &tuning).element.is_present())
            .count();
        let observed = present as f64 / n as f64;
        assert!((observed - tuning.element_slot).abs() < 0.03, "observed {observed}");
    }

    #[test]
    fn zero_probability_slots_are_never_present() {
        let mut tuning = Tuning::default();
        tuning.element_slot = 0.0;
        tuning.comments_slot = 0.0;
        tuning.text_slot = 1.0;
        let mut entropy = SeededEntropy::new(1);
        for _ in 0..100 {
            let plan = ElementHandlerPlan::draw(&mut entropy, &tuning);
            assert_eq!(plan.element, Slot::Absent);
            assert_eq!(plan.comments, Slot::Absent);
            assert!(plan.text.is_present());
        }
    }

    #[test]
    fn emitted_handlers_keep_callback_arguments_local() {
        let model = workerd_surface().expect("model");
        let mut tuning = Tuning::default();
        tuning.element_slot = 1.0;
        tuning.comments_slot = 1.0;
        tuning.text_slot = 1.0;
        for seed in 0..32 {
            let mut entropy = SeededEntropy::new(seed);
            let mut b = ProgramBuilder::new(&model, &tuning, &mut entropy);
            let plan = ElementHandlerPlan::draw(b.entropy(), &tuning);
            let handler = plan.emit(&mut b).expect("emit");
            assert_eq!(b.type_of(handler), &element_handler());
            assert!(b.scope_violations().is_empty());
            let code = b.finish();
            assert!(code.contains("element: f"), "{code}");
            assert!(code.contains("comments: f"), "{code}");
            assert!(code.contains("text: f"), "{code}");
        }
    }

    #[test]
    fn document_handler_appends_a_marker() {
        let model = workerd_surface().expect("model");
        let mut tuning = Tuning::default();
        tuning.document_doctype_slot = 0.0;
        tuning.document_comments_slot = 0.0;
        tuning.document_text_slot = 0.0;
        tuning.document_end_slot = 1.0;
        let mut entropy = SeededEntropy::new(5);
        let mut b = ProgramBuilder::new(&model, &tuning, &mut entropy);
        let plan = DocumentHandlerPlan::draw(b.entropy(), &tuning);
        assert_eq!(plan.populated(), 1);
        plan.emit(&mut b).expect("emit");
        let code = b.finish();
        assert!(code.contains(".append(\"<!-- "), "{code}");
        assert!(code.contains("{ end: f"), "{code}");
    }

    #[test]
    fn every_catalog_generator_emits_valid_code() {
        let model = workerd_surface().expect("model");
        let catalog = GeneratorCatalog::new(&model).expect("catalog");
        let tuning = Tuning::default();
        for generator in catalog.iter() {
            for seed in 0..16 {
                let mut entropy = SeededEntropy::new(seed);
                let mut b = ProgramBuilder::new(&model, &tuning, &mut entropy);
                let v = generator.run(&mut b).expect(generator.name);
                assert_eq!(Some(b.type_of(v).clone()), produced_type(generator));
                assert!(b.scope_violations().is_empty());
            }
        }
        assert_eq!(catalog.find("ElementHandlerGenerator").map(|g| g.weight), Some(15));
        assert_eq!(catalog.producing("HTMLRewriter").len(), 2);
    }

    #[test]
    fn selector_matching_tags_elements_with_their_selector() {
        let model = workerd_surface().expect("model");
        let catalog = GeneratorCatalog::new(&model).expect("catalog");
        let tuning = Tuning::default();
        let mut entropy = SeededEntropy::new(3);
        let mut b = ProgramBuilder::new(&model, &tuning, &mut entropy);
        catalog
            .find("SelectorMatchingGenerator")
            .expect("present")
            .run(&mut b)
            .expect("run");
        let code = b.finish();
        let registrations = code.matches(".on(").count();
        assert!((2..=4).contains(&registrations), "{code}");
        assert!(code.contains(".setAttribute(\"data-selector\", \""), "{code}");
    }

    #[test]
    fn catalog_rejects_models_without_constructed_builtins() {
        let groups = crate::surface_groups().into_iter().chain(crate::host_groups());
        let bare = SurfaceModel::new(groups, []).expect("groups alone are a valid model");
        let err = GeneratorCatalog::new(&bare).expect_err("must fail at construction");
        assert!(matches!(err, FuzzError::Config(_)), "{err}");
        assert!(err.to_string().contains("HTMLRewriter"), "{err}");

        let model = workerd_surface().expect("model");
        let only_rewriter: Vec<(String, TypeDesc)> = model
            .builtins()
            .filter(|(name, _)| *name == "HTMLRewriter")
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        let partial = SurfaceModel::new(model.groups().cloned(), only_rewriter).expect("model");
        let err = GeneratorCatalog::new(&partial).expect_err("must fail at construction");
        assert!(err.to_string().contains("HTMLRewriterTransformGenerator"), "{err}");
        assert!(err.to_string().contains("Response"), "{err}");
    }

    #[test]
    fn catalog_picks_only_registered_generators() {
        let model = workerd_surface().expect("model");
        let catalog = GeneratorCatalog::new(&model).expect("catalog");
        let mut entropy = SeededEntropy::new(12);
        for _ in 0..64 {
            let picked = catalog.pick(&mut entropy).expect("non-empty catalog");
            assert!(catalog.find(picked.name).is_some());
        }
    }

    #[test]
    fn catalog_rejects_models_missing_a_member() {
        let model = workerd_surface().expect("model");
        let trimmed: Vec<ObjectGroup> = model
            .groups()
            .cloned()
            .map(|mut g| {
                if g.name == "String" {
                    g.methods.remove("slice");
                }
                g
            })
            .collect();
        let builtins: Vec<(String, TypeDesc)> =
            model.builtins().map(|(k, v)| (k.to_string(), v.clone())).collect();
        let trimmed = SurfaceModel::new(trimmed, builtins).expect("still a valid model");
        let err = GeneratorCatalog::new(&trimmed).expect_err("must fail");
        assert!(err.to_string().contains("String.slice"), "{err}");
    }
}
