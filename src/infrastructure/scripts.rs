//! 注入页面的脚本
//!
//! 所有脚本共享 `window.__qa` 注册表：元素 → 稳定编号（WeakMap），编号 → 元素（WeakRef）。
//! 注册表只存在 JS 堆上，不修改 DOM，不会反过来触发观察器。

use serde_json::json;

use crate::models::ai_service::PageProfile;
use crate::services::element_locator::LocatorProfile;

/// 页面向 Rust 推送变更批次使用的绑定名
pub const MUTATION_BINDING: &str = "__qaMutations";

const PRELUDE: &str = r#"
  const R = (window.__qa = window.__qa || {
    next: 1, refs: new Map(), ids: new WeakMap(),
    rootTokens: new WeakMap(), nextRoot: 1, observer: null, observedRoot: null,
  });
  const refOf = (el) => {
    let r = R.ids.get(el);
    if (!r) { r = R.next++; R.ids.set(el, r); R.refs.set(r, new WeakRef(el)); }
    return r;
  };
  const byRef = (r) => { const w = R.refs.get(r); return w ? w.deref() : undefined; };
  const rootTokenOf = (root) => {
    let t = R.rootTokens.get(root);
    if (!t) { t = R.nextRoot++; R.rootTokens.set(root, t); }
    return t;
  };
  const isVisible = (el) => {
    if (!el) return false;
    const s = window.getComputedStyle(el);
    return s.display !== "none" && s.visibility !== "hidden" && s.opacity !== "0"
      && (el.offsetWidth > 0 || el.offsetHeight > 0);
  };
"#;

/// 答题页面上定位器以外的选择器
const QUESTION_TEXT_SELECTOR: &str =
    ".center-buttons h1, .question-text, .question-content, .poll-question, h2.question";
const QUESTION_BODY_SELECTOR: &str =
    ".question-data-container, app-numeric-answer-question, .question-type-container";
const TYPE_BANNER_SELECTOR: &str =
    ".question-type-graded-banner, [class*='question-type-graded-banner']";
const NUMERIC_INPUT_SELECTOR: &str =
    "#numericAnswerInput, input[name='numeric-answer'], .numeric-answer-textarea input[type='text']";
const SUBMIT_SELECTOR: &str = "button.button.primary.rounded-button, button[class*='primary'][class*='rounded'], .answer-controls-container button[type='button']:not([disabled])";
const JOIN_CARD_SELECTOR: &str = ".course-join-container";
const JOIN_BUTTON_SELECTORS: [&str; 3] = ["#btnJoin", ".join-btn", "[class*='join'] button"];
const IMAGE_SELECTOR: &str = ".question-image-container img";

/// 在根容器上安装 MutationObserver，已有观察器时先断开
pub fn install_observer(profile: &LocatorProfile) -> String {
    format!(
        r#"(() => {{
  {prelude}
  const root = document.querySelector({root});
  if (!root) return {{ attached: false, rootToken: null }};
  const send = window[{binding}];
  if (typeof send !== "function") return {{ attached: false, rootToken: null }};
  if (R.observer) R.observer.disconnect();
  const summarize = (n) => ({{
    ref: refOf(n), tag: n.tagName.toLowerCase(), id: n.id || "", classes: Array.from(n.classList),
  }});
  R.observer = new MutationObserver((list) => {{
    const batch = [];
    for (const m of list) {{
      if (m.type === "childList") {{
        m.addedNodes.forEach((n) => {{
          if (n instanceof Element) batch.push({{ kind: "nodeAdded", node: summarize(n) }});
        }});
      }} else if (m.type === "attributes" && m.target instanceof Element) {{
        batch.push({{ kind: "attributeChanged", attribute: m.attributeName, node: summarize(m.target) }});
      }}
    }}
    if (batch.length) {{ try {{ send(JSON.stringify(batch)); }} catch (e) {{}} }}
  }});
  R.observer.observe(root, {{ attributes: true, childList: true, subtree: true }});
  R.observedRoot = root;
  return {{ attached: true, rootToken: rootTokenOf(root) }};
}})()"#,
        prelude = PRELUDE,
        root = js_str(&profile.root_selector),
        binding = js_str(MUTATION_BINDING),
    )
}

/// 断开页面内观察器
pub fn disconnect_observer() -> String {
    format!(
        r#"(() => {{
  {prelude}
  if (R.observer) R.observer.disconnect();
  R.observer = null;
  R.observedRoot = null;
  return true;
}})()"#,
        prelude = PRELUDE
    )
}

/// 采集答题页面快照
pub fn dom_snapshot(profile: &LocatorProfile) -> String {
    let p = json!({
        "rootSelector": profile.root_selector,
        "idPrefix": profile.id_prefix,
        "letters": profile.id_suffixes,
        "optionContainer": profile.option_container,
        "optionTag": profile.option_tag,
        "optionClass": profile.option_class,
        "structuralContainer": profile.structural_container,
        "structuralTag": profile.structural_tag,
        "questionText": QUESTION_TEXT_SELECTOR,
        "questionBody": QUESTION_BODY_SELECTOR,
        "banner": TYPE_BANNER_SELECTOR,
        "numericInput": NUMERIC_INPUT_SELECTOR,
        "submit": SUBMIT_SELECTOR,
        "joinCard": JOIN_CARD_SELECTOR,
        "joinButtons": JOIN_BUTTON_SELECTORS,
        "image": IMAGE_SELECTOR,
    });
    format!(
        r#"(() => {{
  {prelude}
  const P = {profile};
  const markers = [P.optionContainer, P.structuralContainer];
  const describe = (el) => ({{
    ref: refOf(el), id: el.id || "", tag: el.tagName.toLowerCase(),
    classes: Array.from(el.classList),
    containers: markers.filter((m) => el.closest("." + m)),
    enabled: !el.disabled, visible: isVisible(el),
    pressed: el.getAttribute("aria-pressed"),
    text: (el.textContent || "").trim(),
  }});
  const seen = new Set();
  const elements = [];
  const add = (el) => {{ if (el && !seen.has(el)) {{ seen.add(el); elements.push(describe(el)); }} }};
  P.letters.forEach((l) => add(document.getElementById(P.idPrefix + l)));
  document.querySelectorAll("." + P.optionContainer + " " + P.optionTag + "." + P.optionClass).forEach(add);
  document.querySelectorAll("." + P.structuralContainer + " " + P.structuralTag).forEach(add);
  const optionLabels = Array.from(document.querySelectorAll("." + P.optionContainer)).map((c) => {{
    const label = c.querySelector(".answer-text, .choice-text, span, p") || c;
    return {{ ref: refOf(c.children[0] || c), text: (label.textContent || "").trim() }};
  }});
  const q = document.querySelector(P.questionText);
  const body = document.querySelector(P.questionBody);
  const centre = document.querySelector(".center-buttons");
  const banner = document.querySelector(P.banner);
  const numeric = document.querySelector(P.numericInput);
  const submit = document.querySelector(P.submit);
  const joinCard = document.querySelector(P.joinCard);
  const join = P.joinButtons.map((s) => document.querySelector(s)).find(Boolean);
  const img = document.querySelector(P.image);
  const root = document.querySelector(P.rootSelector);
  return {{
    url: location.href,
    visible: document.visibilityState === "visible",
    rootToken: root ? rootTokenOf(root) : null,
    observerAttached: !!(root && R.observer && R.observedRoot === root),
    elements,
    optionLabels,
    questionText: q ? q.textContent.trim() : "",
    questionBody: body ? body.innerText.trim() : (centre ? centre.innerText.trim() : ""),
    typeBanner: banner ? banner.textContent.trim() : "",
    numericInput: numeric ? refOf(numeric) : null,
    submitButton: submit ? describe(submit) : null,
    joinCardExpanded: !!(joinCard && joinCard.classList.contains("expanded")),
    joinButton: join ? describe(join) : null,
    questionImage: img && img.src ? img.src : null,
  }};
}})()"#,
        prelude = PRELUDE,
        profile = p,
    )
}

/// 对元素派发完整的指针事件序列
pub fn pointer_click(element_ref: u64) -> String {
    format!(
        r#"(() => {{
  {prelude}
  const el = byRef({element_ref});
  if (!el || !el.isConnected) return false;
  ["mouseenter", "mouseover", "mousedown", "mouseup", "click"].forEach((name) => {{
    el.dispatchEvent(new MouseEvent(name, {{ bubbles: true, cancelable: true, view: window }}));
  }});
  return true;
}})()"#,
        prelude = PRELUDE,
        element_ref = element_ref,
    )
}

/// 用原生 setter 写入输入框并派发 input / change
pub fn fill_value(element_ref: u64, value: &str) -> String {
    format!(
        r#"(() => {{
  {prelude}
  const el = byRef({element_ref});
  if (!el || !el.isConnected) return false;
  el.focus();
  const setter = Object.getOwnPropertyDescriptor(window.HTMLInputElement.prototype, "value")?.set;
  if (setter) setter.call(el, {value}); else el.value = {value};
  el.dispatchEvent(new Event("input", {{ bubbles: true }}));
  el.dispatchEvent(new Event("change", {{ bubbles: true }}));
  return true;
}})()"#,
        prelude = PRELUDE,
        element_ref = element_ref,
        value = js_str(value),
    )
}

/// 读取会话令牌和课程编号
pub fn read_credentials() -> String {
    r#"(() => {
  let token = sessionStorage.getItem("access_token");
  if (!token) {
    const row = document.cookie.split("; ").find((r) => r.startsWith("access_token"));
    token = row ? row.split("=")[1] : null;
  }
  return { accessToken: token || null, courseId: sessionStorage.getItem("courseId") };
})()"#
        .to_string()
}

/// 异步刷新页面，避免求值结果随页面一起丢失
pub fn reload() -> String {
    "(() => { setTimeout(() => location.reload(), 0); return true; })()".to_string()
}

/// 采集 AI 页面快照
pub fn bridge_snapshot(profile: &PageProfile) -> String {
    format!(
        r#"(() => {{
  const P = {profile};
  const first = (list) => list.map((s) => document.querySelector(s)).find(Boolean);
  const input = first(P.input);
  const send = first(P.sendButton);
  const generating = first(P.generating);
  const messages = document.querySelectorAll(P.messages);
  return {{
    url: location.href,
    inputPresent: !!input,
    sendReady: !!(send && !send.disabled),
    generating: !!generating,
    lastMessage: messages.length ? messages[messages.length - 1].textContent.trim() : null,
  }};
}})()"#,
        profile = bridge_profile_json(profile),
    )
}

/// 把提示词写入 AI 页面输入框
pub fn bridge_fill(profile: &PageProfile, text: &str) -> String {
    format!(
        r#"(() => {{
  const P = {profile};
  const text = {text};
  const el = P.input.map((s) => document.querySelector(s)).find(Boolean);
  if (!el) return false;
  el.focus();
  if (el.getAttribute("contenteditable") === "true") {{
    el.textContent = text;
    el.dispatchEvent(new Event("input", {{ bubbles: true }}));
    return true;
  }}
  const setter = Object.getOwnPropertyDescriptor(window.HTMLTextAreaElement.prototype, "value")?.set;
  if (setter) setter.call(el, text); else el.value = text;
  el.dispatchEvent(new Event("input", {{ bubbles: true }}));
  el.dispatchEvent(new Event("change", {{ bubbles: true }}));
  return true;
}})()"#,
        profile = bridge_profile_json(profile),
        text = js_str(text),
    )
}

/// 点击 AI 页面的发送按钮
pub fn bridge_send(profile: &PageProfile) -> String {
    format!(
        r#"(() => {{
  const P = {profile};
  const btn = P.sendButton.map((s) => document.querySelector(s)).find(Boolean);
  if (!btn || btn.disabled) return false;
  btn.click();
  return true;
}})()"#,
        profile = bridge_profile_json(profile),
    )
}

fn bridge_profile_json(profile: &PageProfile) -> serde_json::Value {
    json!({
        "input": profile.input,
        "sendButton": profile.send_button,
        "generating": profile.generating,
        "messages": profile.messages,
    })
}

/// 生成 JS 字符串字面量
fn js_str(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}
