//! Implicit ARIA roles and accessible names.
//!
//! A reduced version of the HTML-AAM mapping: enough to find form controls,
//! links, buttons, headings and landmarks by role and name. The same rules
//! exist twice, once over `scraper` elements for the in-memory page and once
//! as the injected JavaScript used by the Chromium driver.

use crate::text::normalize_whitespace;
use scraper::{ElementRef, Html, Selector};

/// Role of an element: the first token of an explicit `role` attribute,
/// otherwise the implicit role of its tag.
#[must_use]
pub fn role_of(el: &ElementRef<'_>) -> Option<String> {
    if let Some(explicit) = el.value().attr("role") {
        if let Some(first) = explicit.split_whitespace().next() {
            return Some(first.to_ascii_lowercase());
        }
    }
    implicit_role(el).map(str::to_string)
}

fn implicit_role(el: &ElementRef<'_>) -> Option<&'static str> {
    let v = el.value();
    let input_type = v.attr("type").map(str::to_ascii_lowercase);
    match v.name() {
        "a" | "area" if v.attr("href").is_some() => Some("link"),
        "button" => Some("button"),
        "input" => match input_type.as_deref() {
            Some("button" | "submit" | "reset" | "image") => Some("button"),
            Some("checkbox") => Some("checkbox"),
            Some("radio") => Some("radio"),
            Some("range") => Some("slider"),
            Some("number") => Some("spinbutton"),
            Some("search") if v.attr("list").is_none() => Some("searchbox"),
            Some("hidden") => None,
            _ if v.attr("list").is_some() => Some("combobox"),
            _ => Some("textbox"),
        },
        "textarea" => Some("textbox"),
        "select" => {
            if v.attr("multiple").is_some() {
                Some("listbox")
            } else {
                Some("combobox")
            }
        }
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => Some("heading"),
        "nav" => Some("navigation"),
        "main" => Some("main"),
        "header" => Some("banner"),
        "footer" => Some("contentinfo"),
        "aside" => Some("complementary"),
        "search" => Some("search"),
        "form" => Some("form"),
        "dialog" => Some("dialog"),
        "ul" | "ol" => Some("list"),
        "li" => Some("listitem"),
        "table" => Some("table"),
        "tr" => Some("row"),
        "td" => Some("cell"),
        "th" => Some("columnheader"),
        "img" if v.attr("alt") != Some("") => Some("img"),
        "option" => Some("option"),
        "article" => Some("article"),
        _ => None,
    }
}

/// Roles whose accessible name may come from their content
fn name_from_content(role: &str) -> bool {
    matches!(
        role,
        "button"
            | "link"
            | "heading"
            | "cell"
            | "columnheader"
            | "checkbox"
            | "radio"
            | "menuitem"
            | "option"
            | "tab"
            | "listitem"
    )
}

/// Whether the element or one of its ancestors is hidden from the
/// accessibility tree.
#[must_use]
pub fn is_hidden_from_a11y(el: &ElementRef<'_>) -> bool {
    std::iter::once(*el)
        .chain(el.ancestors().filter_map(ElementRef::wrap))
        .any(|e| {
            let v = e.value();
            v.attr("hidden").is_some()
                || v.attr("aria-hidden") == Some("true")
                || style_hides(v.attr("style"))
                || matches!(v.name(), "script" | "style" | "template" | "head")
        })
}

/// Whether an inline style removes the element from rendering
#[must_use]
pub fn style_hides(style: Option<&str>) -> bool {
    style.is_some_and(|s| {
        let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        let compact = compact.to_ascii_lowercase();
        compact.contains("display:none") || compact.contains("visibility:hidden")
    })
}

/// Accessible name of an element (normalized).
#[must_use]
pub fn accessible_name(doc: &Html, el: &ElementRef<'_>) -> String {
    let v = el.value();

    if let Some(label) = v.attr("aria-label") {
        let label = normalize_whitespace(label);
        if !label.is_empty() {
            return label;
        }
    }

    if let Some(ids) = v.attr("aria-labelledby") {
        let joined = ids
            .split_whitespace()
            .filter_map(|id| element_by_id(doc, id))
            .map(|labelled| text_of(&labelled))
            .collect::<Vec<_>>()
            .join(" ");
        let joined = normalize_whitespace(&joined);
        if !joined.is_empty() {
            return joined;
        }
    }

    if matches!(v.name(), "input" | "textarea" | "select") {
        let input_type = v.attr("type").unwrap_or("text").to_ascii_lowercase();
        if matches!(input_type.as_str(), "submit" | "button" | "reset") {
            if let Some(value) = v.attr("value") {
                return normalize_whitespace(value);
            }
            return match input_type.as_str() {
                "submit" => "Submit".to_string(),
                "reset" => "Reset".to_string(),
                _ => String::new(),
            };
        }
        if let Some(label) = label_for(doc, el) {
            return label;
        }
        return v
            .attr("title")
            .or_else(|| v.attr("placeholder"))
            .map(normalize_whitespace)
            .unwrap_or_default();
    }

    if v.name() == "img" {
        if let Some(alt) = v.attr("alt") {
            return normalize_whitespace(alt);
        }
    }

    if role_of(el).is_some_and(|r| name_from_content(&r)) {
        let text = visible_text_of(el);
        if !text.is_empty() {
            return text;
        }
    }

    v.attr("title").map(normalize_whitespace).unwrap_or_default()
}

fn label_for(doc: &Html, el: &ElementRef<'_>) -> Option<String> {
    if let Some(id) = el.value().attr("id") {
        if let Ok(sel) = Selector::parse("label[for]") {
            if let Some(label) = doc
                .select(&sel)
                .find(|l| l.value().attr("for") == Some(id))
            {
                let text = text_of(&label);
                if !text.is_empty() {
                    return Some(text);
                }
            }
        }
    }
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| a.value().name() == "label")
        .map(|label| text_of(&label))
        .filter(|t| !t.is_empty())
}

fn element_by_id<'a>(doc: &'a Html, id: &str) -> Option<ElementRef<'a>> {
    doc.root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().attr("id") == Some(id))
}

/// Normalized text of all descendant text nodes.
#[must_use]
pub fn text_of(el: &ElementRef<'_>) -> String {
    normalize_whitespace(&el.text().collect::<String>())
}

/// Text of descendants that are not hidden from assistive technology.
fn visible_text_of(el: &ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in el.descendants() {
        if let Some(text) = node.value().as_text() {
            let hidden = node
                .ancestors()
                .filter_map(ElementRef::wrap)
                .take_while(|a| a.id() != el.id())
                .any(|a| {
                    a.value().attr("aria-hidden") == Some("true") || a.value().attr("hidden").is_some()
                });
            if !hidden {
                out.push_str(text);
                out.push(' ');
            }
        }
    }
    normalize_whitespace(&out)
}

/// Injected into Chromium pages. Installs `window.__atento`, which tags the
/// nodes it returns so later calls can address them by index. A fresh
/// document gets a fresh random `doc` id, which is how stale references are
/// detected.
pub const RUNTIME_JS: &str = r#"(() => {
  if (window.__atento) return window.__atento;
  const A = { doc: Math.floor(Math.random() * 2147483647), nodes: [], ids: new Map() };
  const ref = (el) => {
    let i = A.ids.get(el);
    if (i === undefined) { i = A.nodes.length; A.nodes.push(el); A.ids.set(el, i); }
    return i;
  };
  const norm = (s) => (s || '').replace(/\s+/g, ' ').trim();
  A.node = (doc, i) => (doc === A.doc && A.nodes[i] && A.nodes[i].isConnected) ? A.nodes[i] : null;
  A.root = (scope) => scope === null ? document : A.nodes[scope];
  const styleHidden = (el) => {
    const cs = getComputedStyle(el);
    return cs.display === 'none' || cs.visibility === 'hidden';
  };
  A.a11yHidden = (el) => {
    for (let e = el; e && e.nodeType === 1; e = e.parentElement) {
      if (e.hidden || e.getAttribute('aria-hidden') === 'true' || styleHidden(e)) return true;
    }
    return false;
  };
  A.implicitRole = (el) => {
    const tag = el.tagName.toLowerCase();
    const type = (el.getAttribute('type') || '').toLowerCase();
    switch (tag) {
      case 'a': case 'area': return el.hasAttribute('href') ? 'link' : null;
      case 'button': return 'button';
      case 'input':
        if (['button', 'submit', 'reset', 'image'].includes(type)) return 'button';
        if (type === 'checkbox') return 'checkbox';
        if (type === 'radio') return 'radio';
        if (type === 'range') return 'slider';
        if (type === 'number') return 'spinbutton';
        if (type === 'hidden') return null;
        if (type === 'search' && !el.hasAttribute('list')) return 'searchbox';
        return el.hasAttribute('list') ? 'combobox' : 'textbox';
      case 'textarea': return 'textbox';
      case 'select': return el.multiple ? 'listbox' : 'combobox';
      case 'h1': case 'h2': case 'h3': case 'h4': case 'h5': case 'h6': return 'heading';
      case 'nav': return 'navigation';
      case 'main': return 'main';
      case 'header': return 'banner';
      case 'footer': return 'contentinfo';
      case 'aside': return 'complementary';
      case 'search': return 'search';
      case 'form': return 'form';
      case 'dialog': return 'dialog';
      case 'ul': case 'ol': return 'list';
      case 'li': return 'listitem';
      case 'table': return 'table';
      case 'tr': return 'row';
      case 'td': return 'cell';
      case 'th': return 'columnheader';
      case 'img': return el.getAttribute('alt') === '' ? null : 'img';
      case 'option': return 'option';
      case 'article': return 'article';
      default: return null;
    }
  };
  A.role = (el) => {
    const explicit = norm(el.getAttribute('role')).split(' ')[0];
    return explicit ? explicit.toLowerCase() : A.implicitRole(el);
  };
  const fromContent = ['button', 'link', 'heading', 'cell', 'columnheader', 'checkbox',
    'radio', 'menuitem', 'option', 'tab', 'listitem'];
  const visibleText = (el) => {
    const walker = document.createTreeWalker(el, NodeFilter.SHOW_TEXT);
    let out = '';
    for (let n = walker.nextNode(); n; n = walker.nextNode()) {
      let hidden = false;
      for (let p = n.parentElement; p && p !== el; p = p.parentElement) {
        if (p.hidden || p.getAttribute('aria-hidden') === 'true') { hidden = true; break; }
      }
      if (!hidden) out += n.nodeValue + ' ';
    }
    return norm(out);
  };
  A.name = (el) => {
    const label = norm(el.getAttribute('aria-label'));
    if (label) return label;
    const by = el.getAttribute('aria-labelledby');
    if (by) {
      const joined = norm(by.split(/\s+/).map((id) => {
        const t = document.getElementById(id);
        return t ? t.textContent : '';
      }).join(' '));
      if (joined) return joined;
    }
    const tag = el.tagName.toLowerCase();
    if (tag === 'input' || tag === 'textarea' || tag === 'select') {
      const type = (el.getAttribute('type') || 'text').toLowerCase();
      if (['submit', 'button', 'reset'].includes(type)) {
        if (el.hasAttribute('value')) return norm(el.getAttribute('value'));
        return type === 'submit' ? 'Submit' : type === 'reset' ? 'Reset' : '';
      }
      const labels = el.labels ? Array.from(el.labels).map((l) => l.textContent).join(' ') : '';
      if (norm(labels)) return norm(labels);
      return norm(el.getAttribute('title') || el.getAttribute('placeholder'));
    }
    if (tag === 'img' && el.hasAttribute('alt')) return norm(el.getAttribute('alt'));
    const role = A.role(el);
    if (role && fromContent.includes(role)) {
      const text = visibleText(el);
      if (text) return text;
    }
    return norm(el.getAttribute('title'));
  };
  const under = (scope) => Array.from(A.root(scope).querySelectorAll('*'));
  A.queryRole = (scope, role) => under(scope)
    .filter((el) => A.role(el) === role && !A.a11yHidden(el))
    .map((el) => ({ index: ref(el), name: A.name(el) }));
  A.queryCss = (scope, css) => Array.from(A.root(scope).querySelectorAll(css)).map(ref);
  const noText = ['SCRIPT', 'STYLE', 'TEMPLATE', 'HEAD', 'TITLE'];
  const texts = (scope) => {
    const out = new Map();
    for (const el of under(scope)) {
      if (noText.includes(el.tagName)) continue;
      const t = norm(el.textContent);
      if (t) out.set(el, t);
    }
    return out;
  };
  A.textCandidates = (scope) => {
    const text = texts(scope);
    const kept = [];
    for (const [el, t] of text) {
      if (!Array.from(el.children).some((c) => text.get(c) === t)) kept.push(el);
    }
    const keptSet = new Set(kept);
    return kept.map((el) => {
      const ancestors = [];
      for (let p = el.parentElement; p; p = p.parentElement) if (keptSet.has(p)) ancestors.push(ref(p));
      return { index: ref(el), text: text.get(el), ancestors };
    });
  };
  A.matchText = (scope, source, flags) => {
    let re;
    try { re = new RegExp(source, flags); } catch (e) { return null; }
    const hits = [];
    for (const [el, t] of texts(scope)) if (re.test(t)) hits.push(el);
    const enclosing = new Set();
    for (const el of hits) {
      for (let p = el.parentElement; p && !enclosing.has(p); p = p.parentElement) enclosing.add(p);
    }
    return hits.filter((el) => !enclosing.has(el)).map(ref);
  };
  A.visible = (el) => {
    if (!el.isConnected || styleHidden(el)) return false;
    const r = el.getBoundingClientRect();
    return r.width > 0 || r.height > 0 || el.getClientRects().length > 0;
  };
  A.fill = (el, text) => {
    el.focus();
    const proto = el.tagName === 'TEXTAREA' ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype;
    const setter = Object.getOwnPropertyDescriptor(proto, 'value').set;
    setter.call(el, text);
    el.dispatchEvent(new Event('input', { bubbles: true }));
    el.dispatchEvent(new Event('change', { bubbles: true }));
  };
  A.center = (el) => {
    el.scrollIntoView({ block: 'center', inline: 'center' });
    const r = el.getBoundingClientRect();
    return { x: r.left + r.width / 2, y: r.top + r.height / 2 };
  };
  window.__atento = A;
  return A;
})()"#;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn first<'a>(doc: &'a Html, css: &str) -> ElementRef<'a> {
        let sel = Selector::parse(css).unwrap();
        doc.select(&sel).next().unwrap()
    }

    mod role_tests {
        use super::*;

        #[test]
        fn test_implicit_roles() {
            let doc = Html::parse_document(
                r#"<a href="/x">l</a><a>no href</a><button>b</button>
                   <input type="submit"><input type="search"><input type="email">
                   <input type="hidden"><h2>h</h2><img alt=""><img alt="logo">"#,
            );
            assert_eq!(role_of(&first(&doc, "a[href]")).as_deref(), Some("link"));
            assert_eq!(role_of(&first(&doc, "a:not([href])")), None);
            assert_eq!(role_of(&first(&doc, "button")).as_deref(), Some("button"));
            assert_eq!(
                role_of(&first(&doc, "input[type=submit]")).as_deref(),
                Some("button")
            );
            assert_eq!(
                role_of(&first(&doc, "input[type=search]")).as_deref(),
                Some("searchbox")
            );
            assert_eq!(
                role_of(&first(&doc, "input[type=email]")).as_deref(),
                Some("textbox")
            );
            assert_eq!(role_of(&first(&doc, "input[type=hidden]")), None);
            assert_eq!(role_of(&first(&doc, "h2")).as_deref(), Some("heading"));
            assert_eq!(role_of(&first(&doc, "img[alt='']")), None);
            assert_eq!(role_of(&first(&doc, "img[alt=logo]")).as_deref(), Some("img"));
        }

        #[test]
        fn test_explicit_role_wins() {
            let doc = Html::parse_document(r##"<div role="Button link">x</div><a href="#" role="tab">t</a>"##);
            assert_eq!(role_of(&first(&doc, "div")).as_deref(), Some("button"));
            assert_eq!(role_of(&first(&doc, "a")).as_deref(), Some("tab"));
        }

        #[test]
        fn test_hidden_from_a11y() {
            let doc = Html::parse_document(
                r#"<div aria-hidden="true"><button id="a">x</button></div>
                   <button id="b" style="display: none">y</button>
                   <button id="c" hidden>z</button><button id="d">w</button>"#,
            );
            assert!(is_hidden_from_a11y(&first(&doc, "#a")));
            assert!(is_hidden_from_a11y(&first(&doc, "#b")));
            assert!(is_hidden_from_a11y(&first(&doc, "#c")));
            assert!(!is_hidden_from_a11y(&first(&doc, "#d")));
        }
    }

    mod name_tests {
        use super::*;

        #[test]
        fn test_aria_label_first() {
            let doc = Html::parse_document(r#"<a href="/s" aria-label="Search BBC">icon</a>"#);
            assert_eq!(accessible_name(&doc, &first(&doc, "a")), "Search BBC");
        }

        #[test]
        fn test_labelledby() {
            let doc = Html::parse_document(
                r#"<span id="l1">Email or</span><span id="l2">username</span>
                   <input aria-labelledby="l1 l2">"#,
            );
            assert_eq!(
                accessible_name(&doc, &first(&doc, "input")),
                "Email or username"
            );
        }

        #[test]
        fn test_label_for_and_wrapping_label() {
            let doc = Html::parse_document(
                r#"<label for="pw">Password</label><input id="pw" type="password">
                   <label>Remember me <input id="rm" type="checkbox"></label>"#,
            );
            assert_eq!(accessible_name(&doc, &first(&doc, "#pw")), "Password");
            assert_eq!(accessible_name(&doc, &first(&doc, "#rm")), "Remember me");
        }

        #[test]
        fn test_placeholder_fallback() {
            let doc = Html::parse_document(r#"<input type="search" placeholder="Search BBC">"#);
            assert_eq!(accessible_name(&doc, &first(&doc, "input")), "Search BBC");
        }

        #[test]
        fn test_submit_input_names() {
            let doc = Html::parse_document(
                r#"<input id="a" type="submit" value=" Continue "><input id="b" type="submit">"#,
            );
            assert_eq!(accessible_name(&doc, &first(&doc, "#a")), "Continue");
            assert_eq!(accessible_name(&doc, &first(&doc, "#b")), "Submit");
        }

        #[test]
        fn test_content_skips_hidden_descendants() {
            let doc = Html::parse_document(
                r#"<button>Sign in<span aria-hidden="true">→</span></button>"#,
            );
            assert_eq!(accessible_name(&doc, &first(&doc, "button")), "Sign in");
        }

        #[test]
        fn test_unnamed_submit_button() {
            let doc = Html::parse_document(r#"<button type="submit"></button>"#);
            assert_eq!(accessible_name(&doc, &first(&doc, "button")), "");
        }
    }

    #[test]
    fn test_style_hides() {
        assert!(style_hides(Some("display: none")));
        assert!(style_hides(Some("color:red; VISIBILITY : hidden")));
        assert!(!style_hides(Some("display:block")));
        assert!(!style_hides(None));
    }
}
