//! Page scripts evaluated through the probe.
//!
//! All selectors here are either derived at runtime (the collection scripts
//! report whatever the markup exposes) or belong to the small set of
//! stable, standards-based fallbacks (`textarea`, `input[type='password']`,
//! `div[contenteditable='true']`). Nothing assumes the host application's
//! class names beyond loose `class*=` vocabulary matching.

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".into())
}

/// Free-text input surfaces, document order.
pub const TEXT_SURFACE_QUERY: &str = "textarea, div[contenteditable='true']";

/// Button-like controls considered clickable by the heuristics.
pub const CLICKABLE_QUERY: &str = "button, div[role='button'], input[type='submit']";

/// Login form inputs.
pub const LOGIN_INPUT_QUERY: &str = "input";

const DESCRIBE_FN: &str = r#"
const describe = (el) => {
    const rect = el.getBoundingClientRect();
    const cls = typeof el.className === 'string'
        ? el.className.split(' ').filter(Boolean)[0]
        : null;
    let selector = el.tagName.toLowerCase();
    if (el.id) {
        selector += '#' + CSS.escape(el.id);
    } else if (cls) {
        selector += '.' + CSS.escape(cls);
    }
    return {
        tag: el.tagName.toLowerCase(),
        selector,
        input_type: el.getAttribute('type'),
        name: el.getAttribute('name'),
        id: el.id || null,
        placeholder: el.getAttribute('placeholder') || el.getAttribute('data-placeholder'),
        label: el.getAttribute('aria-label'),
        title: el.getAttribute('title'),
        text: (el.innerText || el.textContent || '').trim().slice(0, 200),
        rect: { x: rect.x, y: rect.y, width: rect.width, height: rect.height },
        viewport_height: window.innerHeight,
        editable: el.isContentEditable === true,
        has_icon: !!el.querySelector('svg, img'),
    };
};
"#;

/// Snapshot every element matching `query` for engine-side scoring.
pub fn collect_candidates(query: &str) -> String {
    format!(
        r#"(() => {{
{DESCRIBE_FN}
    return Array.from(document.querySelectorAll({query})).map(describe);
}})()"#,
        query = js_string(query),
    )
}

/// A generation/loading indicator is currently visible.
pub const GENERATION_ACTIVE: &str =
    r#"!!document.querySelector("div[class*='loading'], div[class*='spinner']")"#;

/// Text of the latest reply: content sub-blocks of the last message block
/// joined by blank lines, falling back to the block's full text.
pub const EXTRACT_REPLY: &str = r#"(() => {
    const blocks = Array.from(document.querySelectorAll(
        "div[class*='message'], div[class*='chat-message'], div[class*='response']"
    ));
    if (blocks.length === 0) return null;
    const last = blocks[blocks.length - 1];
    const parts = last.querySelectorAll("div[class*='markdown'], pre, code, p");
    if (parts.length > 0) {
        return Array.from(parts)
            .map((part) => part.innerText || part.textContent)
            .join('\n\n');
    }
    return last.innerText || last.textContent;
})()"#;

/// Reasoning side channel: the "thought for N seconds" header and the
/// content of its enclosing container.
pub const EXTRACT_REASONING: &str = r#"(() => {
    const headers = Array.from(document.querySelectorAll('div, span, p')).filter((el) => {
        const text = el.textContent.toLowerCase();
        return text.includes('thought for') && text.includes('seconds');
    });
    if (headers.length === 0) return null;
    const header = headers[0];
    const container = header.closest("div[class*='container'], div[class*='message']");
    let content = '';
    if (container) {
        const parts = container.querySelectorAll("p, div[class*='content']");
        if (parts.length > 0) {
            content = Array.from(parts)
                .map((part) => part.innerText || part.textContent)
                .join('\n');
        }
    }
    return { duration_text: header.textContent, content };
})()"#;

/// Search side channel: items of the container headed by a "search results"
/// label, in on-page order.
pub const EXTRACT_SEARCH_RESULTS: &str = r#"(() => {
    const headers = Array.from(document.querySelectorAll('div, h3, h4')).filter((el) => {
        const text = el.textContent.toLowerCase();
        return text.includes('search') && text.includes('results');
    });
    if (headers.length === 0) return null;
    const container = headers[0].closest("div[class*='container'], div[class*='results']");
    if (!container) return null;
    const items = Array.from(container.querySelectorAll(
        "div[class*='result'], div[class*='item']"
    ));
    return items.map((item) => {
        const img = item.querySelector('img');
        const titleEl = item.querySelector("h3, h4, div[class*='title']");
        const descEl = item.querySelector("p, div[class*='description']");
        const meta = item.querySelectorAll("span, div[class*='meta']");
        let website = '';
        let date = '';
        let index_text = '';
        if (meta.length >= 3) {
            website = meta[0].textContent || '';
            date = meta[1].textContent || '';
            index_text = meta[2].textContent || '';
        }
        return {
            image_url: img ? img.src : '',
            website,
            date,
            index_text,
            title: titleEl ? (titleEl.innerText || titleEl.textContent) : '',
            description: descEl ? (descEl.innerText || descEl.textContent) : '',
        };
    });
})()"#;

pub const CURRENT_URL: &str = "window.location.href";

pub const READY_STATE_COMPLETE: &str = "document.readyState === 'complete'";

pub fn url_contains(fragment: &str) -> String {
    format!(
        "window.location.href.includes({})",
        js_string(fragment)
    )
}

/// The URL no longer denotes a login/sign-in route.
pub const URL_PAST_LOGIN: &str = r#"(() => {
    const url = window.location.href;
    return url.includes('/chat')
        || url.includes('/welcome')
        || url.includes('/dashboard')
        || url.includes('/home')
        || !url.includes('/login');
})()"#;

/// UI markers only shown to logged-in users.
pub const POST_LOGIN_MARKERS: &str = r#"(() => {
    if (document.querySelectorAll('textarea').length > 0) return true;
    if (document.querySelectorAll(
        "div[class*='profile'], div[class*='avatar'], div[class*='user']"
    ).length > 0) return true;
    if (document.querySelectorAll(
        "div[class*='chat'], div[class*='message'], div[class*='conversation']"
    ).length > 0) return true;
    if (document.querySelectorAll(
        "div[class*='welcome'], div[class*='onboarding'], div[class*='getting-started']"
    ).length > 0) return true;
    if (document.querySelectorAll(
        "div[class*='sidebar'], div[class*='nav'], div[class*='menu']"
    ).length > 0) return true;
    return false;
})()"#;

pub const PASSWORD_FIELD_ABSENT: &str = r#"!document.querySelector("input[type='password']")"#;

/// First on-page error text matching the failure vocabulary, or null.
pub const LOGIN_ERROR_TEXT: &str = r#"(() => {
    const nodes = document.querySelectorAll(
        "div[class*='error'], p[class*='error'], span[class*='error'], .notification-error, .error-message"
    );
    for (const el of nodes) {
        const text = el.textContent || '';
        const lower = text.toLowerCase();
        if (lower.includes('incorrect') || lower.includes('invalid')
            || lower.includes('failed') || lower.includes('wrong')) {
            return text.trim();
        }
    }
    return null;
})()"#;

/// Set a field's value through the element prototype so the page's own
/// reactive bindings observe the change.
pub fn fill_field(selector: &str, value: &str) -> String {
    format!(
        r#"(() => {{
    const el = document.querySelector({selector});
    if (!el) return false;
    el.focus();
    const proto = el.tagName === 'TEXTAREA'
        ? window.HTMLTextAreaElement.prototype
        : window.HTMLInputElement.prototype;
    const descriptor = Object.getOwnPropertyDescriptor(proto, 'value');
    if (descriptor && descriptor.set) {{
        descriptor.set.call(el, {value});
    }} else {{
        el.value = {value};
    }}
    el.dispatchEvent(new Event('input', {{ bubbles: true }}));
    el.dispatchEvent(new Event('change', {{ bubbles: true }}));
    return true;
}})()"#,
        selector = js_string(selector),
        value = js_string(value),
    )
}

/// Best-effort click of any consent checkboxes on the login form.
pub const CLICK_CONSENT_CHECKBOXES: &str = r#"(() => {
    const selectors = [
        "input[type='checkbox']",
        "div[class*='checkbox']",
        'label.checkbox',
        "[role='checkbox']",
    ];
    let clicked = 0;
    for (const selector of selectors) {
        for (const el of document.querySelectorAll(selector)) {
            try {
                el.click();
                clicked += 1;
            } catch (e) {
                // ignored: the checkbox may not be required
            }
        }
    }
    return clicked;
})()"#;

const TOKEN_STORAGE_KEY: &str = "userToken";
const THEME_STORAGE_KEY: &str = "__appKit_@deepseek/chat_themePreference";

/// Install the authentication token in client-side storage, versioned the
/// way the application stores it.
pub fn store_token(token: &str) -> String {
    format!(
        "localStorage.setItem('{TOKEN_STORAGE_KEY}', JSON.stringify({{ value: {}, __version: '0' }}))",
        js_string(token),
    )
}

pub fn remove_token() -> String {
    format!("localStorage.removeItem('{TOKEN_STORAGE_KEY}')")
}

pub fn read_token() -> String {
    format!(
        r#"(() => {{
    const raw = localStorage.getItem('{TOKEN_STORAGE_KEY}');
    if (!raw) return null;
    try {{
        const parsed = JSON.parse(raw);
        return parsed && parsed.value !== undefined ? parsed.value : null;
    }} catch (e) {{
        return null;
    }}
}})()"#
    )
}

pub fn store_theme(theme: &str) -> String {
    format!(
        "localStorage.setItem('{THEME_STORAGE_KEY}', JSON.stringify({{ value: {}, __version: '0' }}))",
        js_string(theme),
    )
}

/// A bot-challenge interstitial is currently present.
pub const CHALLENGE_PRESENT: &str = r##"(() => {
    if (document.title.toLowerCase().includes('just a moment')) return true;
    return !!document.querySelector(
        "#challenge-form, #challenge-running, iframe[src*='challenges.cloudflare.com']"
    );
})()"##;

/// Depth-bounded recursive search for a menu item by its visible text,
/// clicking it when found. The dropdown's direct children are wrappers, so
/// a flat child scan is not enough.
pub fn click_menu_item_by_text(container_query: &str, text: &str, depth_limit: u32) -> String {
    format!(
        r#"(() => {{
    const containers = document.querySelectorAll({container});
    const root = containers.length > 0 ? containers[containers.length - 1] : null;
    if (!root) return false;
    const wanted = {text}.toLowerCase();
    const visit = (el, depth) => {{
        for (const child of el.children) {{
            if ((child.textContent || '').trim().toLowerCase() === wanted) return child;
            if (depth > 0) {{
                const found = visit(child, depth - 1);
                if (found) return found;
            }}
        }}
        return null;
    }};
    const found = visit(root, {depth});
    if (!found) return false;
    found.click();
    return true;
}})()"#,
        container = js_string(container_query),
        text = js_string(text),
        depth = depth_limit,
    )
}

/// Trigger regeneration: the second control of the most recent reply's
/// toolbar (host UI convention).
pub const CLICK_REGENERATE: &str = r#"(() => {
    const toolbars = document.querySelectorAll("div[class*='toolbar']");
    if (toolbars.length > 0) {
        const toolbar = toolbars[toolbars.length - 1];
        if (toolbar.children.length < 2) return false;
        toolbar.children[1].click();
        return true;
    }
    const blocks = document.querySelectorAll(
        "div[class*='message'], div[class*='chat-message'], div[class*='response']"
    );
    if (blocks.length === 0) return false;
    const cluster = blocks[blocks.length - 1].querySelectorAll(
        "button, div[role='button']"
    );
    if (cluster.length < 2) return false;
    cluster[1].click();
    return true;
})()"#;
