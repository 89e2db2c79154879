//! Function declarations passed to `Runtime.callFunctionOn`; `this` is the
//! element resolved from a backend node id.

pub(crate) const CONNECTED_FN: &str = r#"function() { return this.isConnected; }"#;

pub(crate) const BOX_FN: &str = r#"
function() {
    if (!this.isConnected || typeof this.getBoundingClientRect !== 'function') { return null; }
    const r = this.getBoundingClientRect();
    return { x: r.x, y: r.y, width: r.width, height: r.height };
}
"#;

pub(crate) const STYLE_FN: &str = r#"
function() {
    const view = this.ownerDocument && this.ownerDocument.defaultView;
    if (!view) { return { display: 'none', visibility: 'hidden', opacity: 0, pointerEvents: 'none' }; }
    const s = view.getComputedStyle(this);
    const opacity = parseFloat(s.opacity);
    return {
        display: s.display,
        visibility: s.visibility,
        opacity: Number.isFinite(opacity) ? opacity : 1,
        pointerEvents: s.pointerEvents,
    };
}
"#;

/// Coordinates are relative to the element's own frame viewport. Points
/// outside that viewport cannot be probed and count as unobstructed.
pub(crate) const HIT_TEST_FN: &str = r#"
function(x, y) {
    const doc = this.ownerDocument;
    const view = doc && doc.defaultView;
    if (!view) { return false; }
    if (x < 0 || y < 0 || x >= view.innerWidth || y >= view.innerHeight) { return true; }
    const root = this.getRootNode();
    const probe = root && typeof root.elementFromPoint === 'function' ? root : doc;
    const hit = probe.elementFromPoint(x, y);
    if (!hit) { return false; }
    if (hit === this || this.contains(hit)) { return true; }
    return hit.tagName === 'LABEL' && hit.control === this;
}
"#;

pub(crate) const TEXT_FN: &str = r#"
function() {
    const raw = typeof this.innerText === 'string' ? this.innerText : this.textContent;
    return (raw || '').replace(/\s+/g, ' ').trim();
}
"#;

pub(crate) const FORM_STATE_FN: &str = r#"
function() {
    const isSelect = this.tagName === 'SELECT';
    const options = isSelect ? Array.from(this.options, o => o.text.trim()) : [];
    const selected = isSelect && this.selectedIndex >= 0 ? this.options[this.selectedIndex].text.trim() : null;
    return {
        disabled: typeof this.matches === 'function' && this.matches(':disabled'),
        readonly: !!this.readOnly,
        value: typeof this.value === 'string' ? this.value : null,
        selected: selected,
        options: options,
        contentEditable: !!this.isContentEditable,
    };
}
"#;

pub(crate) const QUERY_FN: &str = r#"
function(selector) {
    try { return this.querySelector(selector); } catch (err) { return null; }
}
"#;

pub(crate) const SCROLL_INTO_VIEW_FN: &str = r#"
function() {
    if (typeof this.scrollIntoView === 'function') {
        this.scrollIntoView({ block: 'center', inline: 'center', behavior: 'instant' });
    }
}
"#;

pub(crate) const FOCUS_FN: &str = r#"
function(clear) {
    if (typeof this.focus === 'function') { this.focus(); }
    if (clear) {
        if ('value' in this && typeof this.value === 'string') {
            this.value = '';
            this.dispatchEvent(new Event('input', { bubbles: true }));
        } else if (this.isContentEditable) {
            this.textContent = '';
        }
    }
    const active = this.ownerDocument.activeElement;
    return active === this || this.contains(active);
}
"#;

pub(crate) const SELECT_FN: &str = r#"
function(target) {
    const options = Array.from(this.options || []);
    const wanted = String(target).trim();
    const option = options.find(o => o.value === wanted) || options.find(o => o.text.trim() === wanted);
    if (!option) { return { status: 'option-missing', available: options.map(o => o.text.trim()) }; }
    this.value = option.value;
    option.selected = true;
    this.dispatchEvent(new Event('input', { bubbles: true }));
    this.dispatchEvent(new Event('change', { bubbles: true }));
    return { status: 'selected', value: this.value };
}
"#;

pub(crate) const SCROLL_FN: &str = r#"
function(dx, dy) {
    const view = this.ownerDocument.defaultView;
    const style = view.getComputedStyle(this);
    const scrollY = this.scrollHeight > this.clientHeight && /(auto|scroll)/.test(style.overflowY);
    const scrollX = this.scrollWidth > this.clientWidth && /(auto|scroll)/.test(style.overflowX);
    if (scrollX || scrollY) {
        this.scrollBy(dx, dy);
        return 'element';
    }
    view.scrollBy(dx, dy);
    return 'window';
}
"#;

/// Bound to a document or an element. Only text nodes directly under an
/// element count as its own text.
pub(crate) const FIND_TEXT_FN: &str = r#"
function(wanted) {
    const target = String(wanted).replace(/\s+/g, ' ').trim();
    const doc = this.ownerDocument || this;
    const root = this.nodeType === 9 ? (this.body || this.documentElement) : this;
    if (!root || !target) { return false; }
    const own = el => Array.from(el.childNodes)
        .filter(n => n.nodeType === 3)
        .map(n => n.textContent)
        .join(' ')
        .replace(/\s+/g, ' ')
        .trim();
    const walker = doc.createTreeWalker(root, NodeFilter.SHOW_ELEMENT);
    let exact = null;
    let partial = null;
    for (let el = walker.currentNode; el && !exact; el = walker.nextNode()) {
        const text = own(el);
        if (text === target) { exact = el; }
        else if (!partial && text.includes(target)) { partial = el; }
    }
    const hit = exact || partial;
    if (!hit) { return false; }
    hit.scrollIntoView({ block: 'center', inline: 'nearest', behavior: 'instant' });
    return true;
}
"#;

/// The element's inline style is parked in a data attribute while outlined.
pub(crate) const HIGHLIGHT_FN: &str = r#"
function(on) {
    if (!this.style || !this.dataset) { return false; }
    const key = 'pagepilotStyle';
    if (on) {
        if (!(key in this.dataset)) { this.dataset[key] = this.style.cssText; }
        this.style.setProperty('outline', '2px solid red', 'important');
        this.style.setProperty('background-color', 'yellow', 'important');
    } else if (key in this.dataset) {
        this.style.cssText = this.dataset[key];
        delete this.dataset[key];
    }
    return true;
}
"#;
