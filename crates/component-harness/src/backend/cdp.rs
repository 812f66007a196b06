//! Real-browser backend over the Chrome DevTools Protocol.
//!
//! Every operation is a single `Runtime.evaluate` round-trip. Elements are
//! tracked in a page-side registry (`window.__componentHarness`) that maps
//! numeric ids to DOM nodes; an id whose node is no longer connected reports
//! the node as detached.
//!
//! The browser session itself (launch, navigation, the CDP handler task) is
//! owned by the caller; this backend only borrows a [`Page`].

use async_trait::async_trait;
use chromiumoxide::Page;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{Backend, ElementAction, ElementRead, MouseButton, NodeRef};
use crate::config::HarnessConfig;
use crate::environment::HarnessEnvironment;
use crate::event::KeyInput;
use crate::result::{HarnessError, HarnessResult};

const BACKEND_NAME: &str = "cdp";

/// Installs the registry once per document. Nodes are held through
/// `WeakRef`, so removed elements can still be collected; dead entries are
/// swept every 256 registrations.
const BOOTSTRAP: &str = r"
if (!window.__componentHarness) {
  const ids = new WeakMap();
  const nodes = new Map();
  let next = 1;
  const sweep = () => {
    for (const [id, ref] of nodes) { if (ref.deref() === undefined) nodes.delete(id); }
  };
  window.__componentHarness = {
    register(el) {
      let id = ids.get(el);
      if (id === undefined) {
        id = next++;
        ids.set(el, id);
        nodes.set(id, new WeakRef(el));
        if (id % 256 === 0) sweep();
      }
      return id;
    },
    get(id) {
      const ref = nodes.get(id);
      const el = ref && ref.deref();
      if (!el) { nodes.delete(id); return null; }
      return (el === document || el.isConnected) ? el : null;
    },
  };
}
const h = window.__componentHarness;
const ok = (value) => JSON.stringify({ ok: value === undefined ? null : value });
const detached = (id) => JSON.stringify({ detached: id });
";

/// Resolves once pending frames and already-queued tasks have run, plus any
/// app-provided `window.__whenStable()` promise
const SETTLE: &str = r"
await new Promise((resolve) => requestAnimationFrame(() => setTimeout(resolve, 0)));
if (typeof window.__whenStable === 'function') { await window.__whenStable(); }
return ok(true);
";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Reply {
    #[serde(default)]
    ok: Value,
    detached: Option<u64>,
    invalid_selector: Option<String>,
    error: Option<String>,
}

/// Wrap a script body so it always resolves to a JSON reply string
fn wrap(body: &str) -> String {
    format!(
        "(async () => {{\n{BOOTSTRAP}\ntry {{\n{body}\n}} catch (e) {{\n\
         return JSON.stringify({{ error: String((e && e.message) || e) }});\n}}\n}})()"
    )
}

/// Script prelude binding `el` to the registered node, or bailing out
fn bind(var: &str, node: &NodeRef) -> String {
    let id = node.id();
    format!("const {var} = h.get({id}); if (!{var}) return detached({id});\n")
}

fn literal(value: &str) -> String {
    Value::String(value.to_string()).to_string()
}

fn parse_reply(raw: &str, selector: Option<&str>) -> HarnessResult<Value> {
    let reply: Reply = serde_json::from_str(raw)?;
    if let Some(id) = reply.detached {
        return Err(HarnessError::NodeDetached {
            node: NodeRef::new(id),
        });
    }
    if let Some(message) = reply.invalid_selector {
        return Err(HarnessError::InvalidSelector {
            selector: selector.unwrap_or_default().to_string(),
            message,
        });
    }
    if let Some(message) = reply.error {
        return Err(HarnessError::backend(BACKEND_NAME, message));
    }
    Ok(reply.ok)
}

fn read_script(read: &ElementRead) -> String {
    match read {
        ElementRead::Text => "return ok((el.textContent || '').trim());".to_string(),
        ElementRead::Attribute(name) => format!("return ok(el.getAttribute({}));", literal(name)),
        ElementRead::HasClass(name) => format!("return ok(el.classList.contains({}));", literal(name)),
        ElementRead::Dimensions => "const r = el.getBoundingClientRect();\n\
             return ok({ left: r.left, top: r.top, width: r.width, height: r.height });"
            .to_string(),
        ElementRead::IsFocused => "return ok(document.activeElement === el);".to_string(),
        ElementRead::MatchesSelector(css) => format!(
            "try {{ return ok(el.matches({})); }} \
             catch (e) {{ return JSON.stringify({{ invalidSelector: String(e.message) }}); }}",
            literal(css)
        ),
        ElementRead::CssValue(property) => format!(
            "return ok(getComputedStyle(el).getPropertyValue({}));",
            literal(property)
        ),
        ElementRead::Property(name) => format!("return ok(el[{}]);", literal(name)),
    }
}

fn keys_json(keys: &[KeyInput]) -> Value {
    Value::Array(
        keys.iter()
            .map(|key| match key {
                KeyInput::Text(text) => json!({ "text": text }),
                KeyInput::Key(key) => json!({ "key": key.key_name() }),
            })
            .collect(),
    )
}

const MOUSE_HELPERS: &str = r"
const point = (node, offset) => {
  const r = node.getBoundingClientRect();
  return offset ? { x: r.left + offset.x, y: r.top + offset.y }
                : { x: r.left + r.width / 2, y: r.top + r.height / 2 };
};
const mouse = (node, type, p, button) => node.dispatchEvent(new MouseEvent(type, {
  bubbles: type !== 'mouseenter' && type !== 'mouseleave', cancelable: true, view: window,
  clientX: p.x, clientY: p.y, button,
}));
";

fn action_script(action: &ElementAction) -> String {
    match action {
        ElementAction::Click { offset, button } => {
            let offset = offset.as_ref().map_or(Value::Null, |p| json!({ "x": p.x, "y": p.y }));
            let (button, last) = match button {
                MouseButton::Left => (0, "click"),
                MouseButton::Right => (2, "contextmenu"),
            };
            format!(
                "{MOUSE_HELPERS}\
                 if (el.disabled) return ok(null);\n\
                 el.scrollIntoView({{ block: 'center', inline: 'center' }});\n\
                 const p = point(el, {offset});\n\
                 mouse(el, 'mousedown', p, {button});\n\
                 mouse(el, 'mouseup', p, {button});\n\
                 mouse(el, '{last}', p, {button});\n\
                 return ok(null);"
            )
        }
        ElementAction::Focus => "el.focus(); return ok(null);".to_string(),
        ElementAction::Blur => "el.blur(); return ok(null);".to_string(),
        ElementAction::Clear => "if (el.disabled) return ok(null);\n\
             el.focus(); el.value = '';\n\
             el.dispatchEvent(new Event('input', { bubbles: true }));\n\
             return ok(null);"
            .to_string(),
        ElementAction::SendKeys { modifiers, keys } => {
            let mods = json!({
                "ctrlKey": modifiers.control,
                "altKey": modifiers.alt,
                "shiftKey": modifiers.shift,
                "metaKey": modifiers.meta,
            });
            format!(
                "if (el.disabled) return ok(null);\n\
                 el.focus();\n\
                 const mods = {mods};\n\
                 const key = (type, k) => el.dispatchEvent(new KeyboardEvent(type, \
                   Object.assign({{ key: k, bubbles: true, cancelable: true }}, mods)));\n\
                 const input = () => el.dispatchEvent(new Event('input', {{ bubbles: true }}));\n\
                 for (const entry of {keys}) {{\n\
                   if (entry.text !== undefined) {{\n\
                     for (const ch of entry.text) {{\n\
                       key('keydown', ch); key('keypress', ch);\n\
                       if ('value' in el) {{ el.value += ch; input(); }}\n\
                       key('keyup', ch);\n\
                     }}\n\
                   }} else {{\n\
                     key('keydown', entry.key);\n\
                     if (entry.key === 'Backspace' && 'value' in el && el.value.length) {{\n\
                       el.value = el.value.slice(0, -1); input();\n\
                     }}\n\
                     if (entry.key === 'Enter') key('keypress', entry.key);\n\
                     key('keyup', entry.key);\n\
                   }}\n\
                 }}\n\
                 return ok(null);",
                keys = keys_json(keys)
            )
        }
        ElementAction::Hover => format!(
            "{MOUSE_HELPERS}\
             const p = point(el, null);\n\
             mouse(el, 'mouseenter', p, 0); mouse(el, 'mouseover', p, 0);\n\
             return ok(null);"
        ),
        ElementAction::MouseAway => format!(
            "{MOUSE_HELPERS}\
             const p = point(el, null);\n\
             mouse(el, 'mouseleave', p, 0); mouse(el, 'mouseout', p, 0);\n\
             return ok(null);"
        ),
        ElementAction::SetInputValue(value) => {
            format!("el.value = {}; return ok(null);", literal(value))
        }
        ElementAction::DispatchEvent { name, data } => format!(
            "const event = new Event({}, {{ bubbles: true, cancelable: true }});\n\
             Object.assign(event, {});\n\
             el.dispatchEvent(event);\n\
             return ok(null);",
            literal(name),
            Value::Object(data.clone().into_iter().collect())
        ),
        ElementAction::DragTo { target } => format!(
            "{bind_target}\
             const drag = (node, type) => node.dispatchEvent(new DragEvent(type, \
               {{ bubbles: true, cancelable: true, dataTransfer: new DataTransfer() }}));\n\
             drag(el, 'dragstart');\n\
             drag(target, 'dragenter'); drag(target, 'dragover'); drag(target, 'drop');\n\
             drag(el, 'dragend');\n\
             return ok(null);",
            bind_target = bind("target", target)
        ),
    }
}

/// Backend driving a live page.
#[derive(Debug, Clone)]
pub struct CdpBackend {
    page: Page,
    config: HarnessConfig,
}

impl CdpBackend {
    /// Wrap a page owned by the caller's browser session
    #[must_use]
    pub const fn new(page: Page, config: HarnessConfig) -> Self {
        Self { page, config }
    }

    /// Root environment over this page
    #[must_use]
    pub fn environment(&self) -> HarnessEnvironment {
        HarnessEnvironment::new(Arc::new(self.clone()), self.config.clone())
    }

    async fn run(&self, body: &str, selector: Option<&str>) -> HarnessResult<Value> {
        let raw: String = self
            .page
            .evaluate(wrap(body))
            .await
            .map_err(|e| HarnessError::backend(BACKEND_NAME, e.to_string()))?
            .into_value()
            .map_err(|e| HarnessError::backend(BACKEND_NAME, e.to_string()))?;
        parse_reply(&raw, selector)
    }

    async fn run_on(&self, node: &NodeRef, body: &str) -> HarnessResult<Value> {
        self.run(&format!("{}{body}", bind("el", node)), None).await
    }
}

#[async_trait]
impl Backend for CdpBackend {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn force_stabilize(&self) -> HarnessResult<()> {
        let timeout = self.config.stabilize_timeout();
        match tokio::time::timeout(timeout, self.run(SETTLE, None)).await {
            Ok(result) => result.map(|_| ()),
            Err(_) => Err(HarnessError::StabilityTimeout {
                backend: BACKEND_NAME.to_string(),
                cycles: self.config.stabilize_timeout_ms,
                pending: 0,
            }),
        }
    }

    async fn document_root(&self) -> HarnessResult<NodeRef> {
        let id: u64 = serde_json::from_value(self.run("return ok(h.register(document));", None).await?)?;
        Ok(NodeRef::new(id))
    }

    async fn raw_find(&self, selector: &str, scope: &NodeRef) -> HarnessResult<Vec<NodeRef>> {
        let body = format!(
            "{}let found;\n\
             try {{ found = Array.from(el.querySelectorAll({})); }}\n\
             catch (e) {{ return JSON.stringify({{ invalidSelector: String(e.message) }}); }}\n\
             return ok(found.map((node) => h.register(node)));",
            bind("el", scope),
            literal(selector)
        );
        let ids: Vec<u64> = serde_json::from_value(self.run(&body, Some(selector)).await?)?;
        Ok(ids.into_iter().map(NodeRef::new).collect())
    }

    async fn is_stale(&self, node: &NodeRef) -> HarnessResult<bool> {
        let body = format!("return ok(!h.get({}));", node.id());
        Ok(serde_json::from_value(self.run(&body, None).await?)?)
    }

    async fn describe(&self, node: &NodeRef) -> HarnessResult<String> {
        let body = "const tag = el.tagName.toLowerCase();\n\
             const attrs = ['id', 'class', 'type', 'disabled']\n\
               .filter((a) => el.hasAttribute(a))\n\
               .map((a) => el.getAttribute(a) ? ` ${a}=\"${el.getAttribute(a)}\"` : ` ${a}`)\n\
               .join('');\n\
             let text = (el.textContent || '').trim();\n\
             if (text.length > 40) text = text.slice(0, 37) + '...';\n\
             return ok(`<${tag}${attrs}>${text}</${tag}>`);";
        Ok(serde_json::from_value(self.run_on(node, body).await?)?)
    }

    async fn read(&self, node: &NodeRef, read: &ElementRead) -> HarnessResult<Value> {
        let selector = match read {
            ElementRead::MatchesSelector(css) => Some(css.as_str()),
            _ => None,
        };
        let body = format!("{}{}", bind("el", node), read_script(read));
        self.run(&body, selector).await
    }

    async fn perform(&self, node: &NodeRef, action: &ElementAction) -> HarnessResult<()> {
        self.run_on(node, &action_script(action)).await.map(|_| ())
    }
}
