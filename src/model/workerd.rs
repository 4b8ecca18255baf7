//! The workerd HTMLRewriter / fetch surface and the host groups the
//! generators touch.

use crate::{FuzzResult, ObjectGroup, Param, Signature, SurfaceModel, TypeDesc};

pub fn html_rewriter() -> TypeDesc {
    TypeDesc::object("HTMLRewriter", &[], &["on", "onDocument", "transform"])
}

pub fn html_rewriter_constructor() -> TypeDesc {
    TypeDesc::constructor(vec![], html_rewriter())
}

pub fn html_element() -> TypeDesc {
    TypeDesc::object(
        "HTMLElement",
        &["tagName", "attributes", "namespaceURI", "removed"],
        &[
            "getAttribute",
            "setAttribute",
            "hasAttribute",
            "removeAttribute",
            "before",
            "after",
            "prepend",
            "append",
            "replace",
            "remove",
            "removeAndKeepContent",
            "setInnerContent",
            "onEndTag",
        ],
    )
}

pub fn html_end_tag() -> TypeDesc {
    TypeDesc::object("HTMLEndTag", &["name"], &["before", "after", "remove"])
}

pub fn html_comment() -> TypeDesc {
    TypeDesc::object("HTMLComment", &["text", "removed"], &["before", "after", "replace", "remove"])
}

pub fn html_text_chunk() -> TypeDesc {
    TypeDesc::object(
        "HTMLTextChunk",
        &["text", "lastInTextNode", "removed"],
        &["before", "after", "replace", "remove"],
    )
}

pub fn html_doctype() -> TypeDesc {
    TypeDesc::object("HTMLDoctype", &["name", "publicId", "systemId"], &[])
}

pub fn html_document_end() -> TypeDesc {
    TypeDesc::object("HTMLDocumentEnd", &[], &["append"])
}

pub fn element_handler() -> TypeDesc {
    TypeDesc::object("ElementHandler", &["element", "comments", "text"], &[])
}

pub fn document_handler() -> TypeDesc {
    TypeDesc::object("DocumentHandler", &["doctype", "comments", "text", "end"], &[])
}

pub fn content_options() -> TypeDesc {
    TypeDesc::object("ContentOptions", &["html"], &[])
}

pub fn headers() -> TypeDesc {
    TypeDesc::object(
        "Headers",
        &[],
        &["append", "delete", "entries", "forEach", "get", "has", "keys", "set", "values"],
    )
}

pub fn headers_constructor() -> TypeDesc {
    TypeDesc::constructor(vec![Param::opt(TypeDesc::anything())], headers())
        .with_statics("HeadersConstructor")
}

pub fn response() -> TypeDesc {
    TypeDesc::object(
        "Response",
        &["status", "statusText", "headers", "body", "url", "ok", "redirected", "type", "bodyUsed"],
        &["arrayBuffer", "blob", "formData", "json", "text", "clone"],
    )
}

pub fn response_init() -> TypeDesc {
    TypeDesc::object("ResponseInit", &["headers", "status", "statusText"], &[])
}

pub fn response_constructor() -> TypeDesc {
    TypeDesc::constructor(
        vec![Param::opt(TypeDesc::anything()), Param::opt(TypeDesc::plain_object())],
        response(),
    )
    .with_statics("ResponseConstructor")
}

pub fn js_promise() -> TypeDesc {
    TypeDesc::object("Promise", &[], &["then", "catch"])
}

pub fn js_error() -> TypeDesc {
    TypeDesc::object("Error", &["message"], &["toString"])
}

/// Callback taking one value of type `arg`.
pub fn callback(arg: TypeDesc) -> TypeDesc {
    TypeDesc::function(vec![Param::plain(arg)], TypeDesc::undefined())
}

fn content() -> Param {
    Param::plain(TypeDesc::string())
}

fn options() -> Param {
    Param::opt(content_options())
}

fn content_method(returns: TypeDesc) -> Signature {
    Signature::new(vec![content(), options()], returns)
}

fn no_args(returns: TypeDesc) -> Signature {
    Signature::new(vec![], returns)
}

fn strings(n: usize, returns: TypeDesc) -> Signature {
    Signature::new((0..n).map(|_| Param::plain(TypeDesc::string())).collect(), returns)
}

pub fn surface_groups() -> Vec<ObjectGroup> {
    vec![
        ObjectGroup::surface("HTMLRewriter", html_rewriter())
            .method(
                "on",
                Signature::new(
                    vec![Param::plain(TypeDesc::string()), Param::plain(element_handler())],
                    html_rewriter(),
                ),
            )
            .method(
                "onDocument",
                Signature::new(vec![Param::plain(document_handler())], html_rewriter()),
            )
            .method("transform", Signature::new(vec![Param::plain(response())], response())),
        ObjectGroup::surface("HTMLElement", html_element())
            .property("tagName", TypeDesc::string())
            .property("attributes", TypeDesc::iterable())
            .property("namespaceURI", TypeDesc::string())
            .property("removed", TypeDesc::boolean())
            .method("getAttribute", strings(1, TypeDesc::string() | TypeDesc::null()))
            .method("setAttribute", strings(2, html_element()))
            .method("hasAttribute", strings(1, TypeDesc::boolean()))
            .method("removeAttribute", strings(1, html_element()))
            .method("before", content_method(html_element()))
            .method("after", content_method(html_element()))
            .method("prepend", content_method(html_element()))
            .method("append", content_method(html_element()))
            .method("replace", content_method(html_element()))
            .method("setInnerContent", content_method(html_element()))
            .method("remove", no_args(html_element()))
            .method("removeAndKeepContent", no_args(html_element()))
            .method(
                "onEndTag",
                Signature::new(vec![Param::plain(callback(html_end_tag()))], TypeDesc::undefined()),
            ),
        ObjectGroup::surface("HTMLEndTag", html_end_tag())
            .property("name", TypeDesc::string())
            .method("before", content_method(html_end_tag()))
            .method("after", content_method(html_end_tag()))
            .method("remove", no_args(html_end_tag())),
        ObjectGroup::surface("HTMLComment", html_comment())
            .property("text", TypeDesc::string())
            .property("removed", TypeDesc::boolean())
            .method("before", content_method(html_comment()))
            .method("after", content_method(html_comment()))
            .method("replace", content_method(html_comment()))
            .method("remove", no_args(html_comment())),
        ObjectGroup::surface("HTMLTextChunk", html_text_chunk())
            .property("text", TypeDesc::string())
            .property("lastInTextNode", TypeDesc::boolean())
            .property("removed", TypeDesc::boolean())
            .method("before", content_method(html_text_chunk()))
            .method("after", content_method(html_text_chunk()))
            .method("replace", content_method(html_text_chunk()))
            .method("remove", no_args(html_text_chunk())),
        ObjectGroup::surface("HTMLDoctype", html_doctype())
            .property("name", TypeDesc::string() | TypeDesc::null())
            .property("publicId", TypeDesc::string() | TypeDesc::null())
            .property("systemId", TypeDesc::string() | TypeDesc::null()),
        ObjectGroup::surface("HTMLDocumentEnd", html_document_end())
            .method("append", content_method(html_document_end())),
        ObjectGroup::surface("ElementHandler", element_handler())
            .property("element", callback(html_element()))
            .property("comments", callback(html_comment()))
            .property("text", callback(html_text_chunk())),
        ObjectGroup::surface("DocumentHandler", document_handler())
            .property("doctype", callback(html_doctype()))
            .property("comments", callback(html_comment()))
            .property("text", callback(html_text_chunk()))
            .property("end", callback(html_document_end())),
        ObjectGroup::surface("ContentOptions", content_options())
            .property("html", TypeDesc::boolean()),
        ObjectGroup::surface("Headers", headers())
            .method("append", strings(2, TypeDesc::undefined()))
            .method("delete", strings(1, TypeDesc::undefined()))
            .method("entries", no_args(TypeDesc::iterable()))
            .method(
                "forEach",
                Signature::new(
                    vec![
                        Param::plain(TypeDesc::function(vec![], TypeDesc::undefined())),
                        Param::opt(TypeDesc::plain_object()),
                    ],
                    TypeDesc::undefined(),
                ),
            )
            .method("get", strings(1, TypeDesc::string() | TypeDesc::null()))
            .method("has", strings(1, TypeDesc::boolean()))
            .method("keys", no_args(TypeDesc::iterable()))
            .method("set", strings(2, TypeDesc::undefined()))
            .method("values", no_args(TypeDesc::iterable())),
        ObjectGroup::surface("HeadersConstructor", headers_constructor())
            .constructor_path("Headers")
            .property("prototype", headers()),
        ObjectGroup::surface("Response", response())
            .property("status", TypeDesc::integer())
            .property("statusText", TypeDesc::string())
            .property("headers", headers())
            .property("body", TypeDesc::plain_object() | TypeDesc::null())
            .property("url", TypeDesc::string())
            .property("ok", TypeDesc::boolean())
            .property("redirected", TypeDesc::boolean())
            .property("type", TypeDesc::string())
            .property("bodyUsed", TypeDesc::boolean())
            .method("arrayBuffer", no_args(js_promise()))
            .method("blob", no_args(js_promise()))
            .method("formData", no_args(js_promise()))
            .method("json", no_args(js_promise()))
            .method("text", no_args(js_promise()))
            .method("clone", no_args(response())),
        ObjectGroup::surface("ResponseInit", response_init())
            .property("headers", headers())
            .property("status", TypeDesc::integer())
            .property("statusText", TypeDesc::string()),
        ObjectGroup::surface("ResponseConstructor", response_constructor())
            .constructor_path("Response")
            .property("prototype", response())
            .method("error", no_args(response()))
            .method(
                "redirect",
                Signature::new(
                    vec![Param::plain(TypeDesc::string()), Param::opt(TypeDesc::integer())],
                    response(),
                ),
            )
            .method(
                "json",
                Signature::new(
                    vec![Param::plain(TypeDesc::anything()), Param::opt(TypeDesc::plain_object())],
                    response(),
                ),
            ),
    ]
}

pub fn host_groups() -> Vec<ObjectGroup> {
    vec![
        ObjectGroup::host("String", TypeDesc::string())
            .method(
                "slice",
                Signature::new(
                    vec![Param::opt(TypeDesc::integer()), Param::opt(TypeDesc::integer())],
                    TypeDesc::string(),
                ),
            )
            .method("toString", no_args(TypeDesc::string())),
        ObjectGroup::host("Promise", js_promise())
            .method(
                "then",
                Signature::new(
                    vec![
                        Param::plain(TypeDesc::function(vec![], TypeDesc::anything())),
                        Param::opt(TypeDesc::function(vec![], TypeDesc::anything())),
                    ],
                    js_promise(),
                ),
            )
            .method(
                "catch",
                Signature::new(
                    vec![Param::plain(TypeDesc::function(vec![], TypeDesc::anything()))],
                    js_promise(),
                ),
            ),
        ObjectGroup::host("Error", js_error())
            .property("message", TypeDesc::string())
            .method("toString", no_args(TypeDesc::string())),
    ]
}

pub fn surface_builtins() -> Vec<(String, TypeDesc)> {
    vec![
        ("HTMLRewriter".to_string(), html_rewriter_constructor()),
        ("Headers".to_string(), headers_constructor()),
        ("Response".to_string(), response_constructor()),
    ]
}

/// The full model: surface groups, host groups and builtins.
pub fn workerd_surface() -> FuzzResult<SurfaceModel> {
    let groups = surface_groups().into_iter().chain(host_groups());
    SurfaceModel::new(groups, surface_builtins())
}
