//! Scripts embedded in every chart document. They talk to the host only
//! through `window.parent.postMessage`; message types match [`crate::bridge`].

/// Forwards uncaught errors to the host, then defers to any earlier handler.
pub const ERROR_REPORT_SCRIPT: &str = r#"
(function(){
  var previous = window.onerror;
  window.onerror = function(msg, src, line, col, err) {
    try {
      if (window.parent !== window) {
        window.parent.postMessage({
          type: 'chart-script-error',
          error: String(msg || err),
          src: String(src || ''),
          line: line,
          col: col
        }, '*');
      }
    } catch (e) {}
    return previous ? previous.apply(this, arguments) : false;
  };
})();
"#;

/// Reports the chart root height at load, +150ms, +500ms and after resizes.
pub const HEIGHT_REPORT_SCRIPT: &str = r#"
(function(){
  function chartEl(){
    var wrap = document.querySelector('[id^="chart-"][id$="-wrap"]');
    if (wrap) return wrap.querySelector('[id^="chart-"]:not([id$="-hint"])');
    return document.querySelector('[id^="chart-"]:not([id*="-wrap"]):not([id*="-hint"])');
  }
  function send(){
    var el = chartEl();
    var h = el ? Math.max(el.scrollHeight || 0, el.offsetHeight || 0, el.clientHeight || 0) : 0;
    if (h > 0 && window.parent !== window) {
      try { window.parent.postMessage({ type: 'chart-height-report', height: Math.ceil(h) }, '*'); } catch (e) {}
    }
  }
  send();
  setTimeout(send, 150);
  setTimeout(send, 500);
  var pending = null;
  window.addEventListener('resize', function(){
    if (pending) clearTimeout(pending);
    pending = setTimeout(send, 100);
  });
})();
"#;

/// Answers `chart-export-request` with a 2x PNG of the chart on white.
pub const EXPORT_SCRIPT: &str = r#"
(function(){
  function chartEl(){
    var wrap = document.querySelector('[id^="chart-"][id$="-wrap"]');
    if (wrap) return wrap.querySelector('[id^="chart-"]:not([id$="-hint"])');
    return document.querySelector('[id^="chart-"]:not([id*="-wrap"]):not([id*="-hint"])');
  }
  function reply(payload){
    if (window.parent === window) return;
    payload.type = 'chart-export-result';
    try { window.parent.postMessage(payload, '*'); } catch (e) {}
  }
  window.addEventListener('message', function(e){
    if (!e.data || e.data.type !== 'chart-export-request') return;
    var el = chartEl();
    var lib = (typeof echarts !== 'undefined' ? echarts : window.echarts);
    var chart = el && lib ? lib.getInstanceByDom(el) : null;
    if (!chart || !chart.getDataURL) {
      reply({ error: 'Chart not found' });
      return;
    }
    try {
      reply({ dataUrl: chart.getDataURL({ type: 'png', pixelRatio: 2, backgroundColor: '#ffffff' }) });
    } catch (err) {
      reply({ error: String(err) });
    }
  });
})();
"#;
