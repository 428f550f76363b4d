use agentchat_render::{
    build_chart_document, extract_plain_text, prepare_plain_html, render_assistant_html,
    sanitize, segment, wrap_tables, BridgeEvent, BridgeHub, BridgeMessage, ChartKind,
    ContentSegment, ExportState, FramePhase, RenderError, RenderedBlock, IFRAME_SANDBOX,
};
use pretty_assertions::assert_eq;
use serde_json::json;

const CHART: &str = r#"<div id="chart-sales" style="width:100%;height:400px"></div><script>var c = echarts.init(document.getElementById('chart-sales')); c.setOption({series:[{type:'bar',data:[1,2]}]});</script>"#;

const PIE_CHART: &str = r#"<div id="chart-share" style="height:900px"></div><script>echarts.init(document.getElementById("chart-share")).setOption({series:[{type:'pie',data:[]}]});</script>"#;

fn plain(html: &str) -> ContentSegment {
    ContentSegment::PlainHtml {
        html: html.to_string(),
    }
}

fn chart(html: &str) -> ContentSegment {
    ContentSegment::Chart {
        chart_html: html.to_string(),
    }
}

// --- Segmenter ---

#[test]
fn test_no_chart_is_single_plain_segment() {
    let html = "<p>Hello</p><table><tr><td>1</td></tr></table>";
    assert_eq!(segment(html), vec![plain(html)]);
}

#[test]
fn test_empty_input_has_no_segments() {
    assert!(segment("").is_empty());
}

#[test]
fn test_plain_chart_plain_ordering() {
    let html = format!("<p>A</p>{}<p>B</p>", CHART);
    assert_eq!(
        segment(&html),
        vec![plain("<p>A</p>"), chart(CHART), plain("<p>B</p>")]
    );
}

#[test]
fn test_whitespace_gaps_between_charts_are_dropped() {
    let html = format!("{}\n  \n{}", CHART, PIE_CHART);
    assert_eq!(segment(&html), vec![chart(CHART), chart(PIE_CHART)]);
}

#[test]
fn test_wrap_element_is_the_block_boundary() {
    let block = r#"<div id="chart-q-wrap"><div id="chart-q-hint">Drag to zoom</div><div id="chart-q"></div></div><script>echarts.init(document.getElementById('chart-q'));</script>"#;
    let html = format!("<h2>Trend</h2>{}", block);
    assert_eq!(segment(&html), vec![plain("<h2>Trend</h2>"), chart(block)]);
}

#[test]
fn test_script_inside_wrap_keeps_block_whole() {
    let block = r#"<div id="chart-k-wrap"><div id="chart-k"></div><script>echarts.init(document.getElementById('chart-k'));</script></div>"#;
    let html = format!("<p>x</p>{}<p>y</p>", block);
    assert_eq!(
        segment(&html),
        vec![plain("<p>x</p>"), chart(block), plain("<p>y</p>")]
    );
}

#[test]
fn test_loader_script_joins_the_block() {
    let block = format!(
        r#"<script src="https://cdn.jsdelivr.net/npm/echarts@5/dist/echarts.min.js"></script>{}"#,
        CHART
    );
    let html = format!("<p>Intro</p>{}", block);
    assert_eq!(segment(&html), vec![plain("<p>Intro</p>"), chart(&block)]);
}

#[test]
fn test_container_found_without_id_reference() {
    let block = r#"<div id="chart-z"></div><script>var el = document.querySelector('div'); echarts.init(el);</script>"#;
    assert_eq!(segment(block), vec![chart(block)]);
}

#[test]
fn test_partial_markers_stay_plain() {
    let orphan_script = "<p>a</p><script>echarts.init(document.body)</script>";
    assert_eq!(segment(orphan_script), vec![plain(orphan_script)]);

    let orphan_div = r#"<div id="chart-lonely"></div><p>b</p>"#;
    assert_eq!(segment(orphan_div), vec![plain(orphan_div)]);
}

#[test]
fn test_deep_nesting_degrades_to_plain() {
    let html = format!("{}{}{}", "<div>".repeat(400), CHART, "</div>".repeat(400));
    assert_eq!(segment(&html), vec![plain(&html)]);
}

#[test]
fn test_malformed_markup_does_not_panic() {
    for html in ["<", "<div", "</p></p>", "<script>echarts.init(", "<<>>", "<a href='x>y"] {
        let segments = segment(html);
        assert_eq!(segments.len(), 1, "input {:?}", html);
    }
}

#[test]
fn test_segment_serializes_with_kind_tag() {
    let value = serde_json::to_value(chart("<div></div>")).unwrap();
    assert_eq!(value, json!({"kind": "chart", "chartHtml": "<div></div>"}));
    let value = serde_json::to_value(plain("<p></p>")).unwrap();
    assert_eq!(value, json!({"kind": "plainHtml", "html": "<p></p>"}));
}

// --- Sanitizer ---

#[test]
fn test_script_and_handlers_are_stripped() {
    let html = r#"<p onclick="steal()">Hi<script>alert(1)</script></p><img src="x.png" onerror="alert(2)">"#;
    assert_eq!(sanitize(html), r#"<p>Hi</p><img src="x.png">"#);
}

#[test]
fn test_dangerous_urls_are_removed() {
    let html = r#"<a href="javascript:alert(1)">x</a><a href="https://ok.example/a">y</a><img src="data:text/html;base64,AAAA">"#;
    assert_eq!(
        sanitize(html),
        r#"<a>x</a><a href="https://ok.example/a">y</a><img>"#
    );
}

#[test]
fn test_unknown_tags_are_unwrapped() {
    assert_eq!(
        sanitize("<custom-card><b>bold</b></custom-card><!-- note -->"),
        "<b>bold</b>"
    );
}

#[test]
fn test_drop_with_content_elements() {
    let html = "<p>keep</p><style>p{color:red}</style><iframe src=\"x\"><p>inner</p></iframe><svg><svg></svg><text>t</text></svg>";
    assert_eq!(sanitize(html), "<p>keep</p>");
}

#[test]
fn test_sanitize_is_idempotent() {
    let inputs = [
        r#"<p title="a&quot;b" class=x>1 < 2 &amp; 3 > 0</p>"#,
        r#"<div style="color:red" data-x="1"><a href=" java script:x">l</a></div>"#,
        "<table><tr><td colspan=2 onmouseover=x>c</td></tr></table>",
        "a <b",
    ];
    for input in inputs {
        let once = sanitize(input);
        assert_eq!(sanitize(&once), once, "input {:?}", input);
    }
}

// --- Table wrapper ---

#[test]
fn test_table_bytes_are_preserved() {
    let table = r#"<table class="data"><thead><tr><th>A</th></tr></thead><tbody><tr><td>1</td></tr></tbody></table>"#;
    let html = format!("<p>before</p>{}<p>after</p>", table);
    assert_eq!(
        wrap_tables(&html),
        format!(
            "<p>before</p><div class=\"assistant-table-scroll-wrapper\">{}</div><p>after</p>",
            table
        )
    );
}

#[test]
fn test_nested_and_unclosed_tables() {
    let html = "<table><tr><td><table><tr><td>x</td></tr></table></td></tr></table><table><tr><td>open";
    let open = "<div class=\"assistant-table-scroll-wrapper\">";
    assert_eq!(
        wrap_tables(html),
        format!(
            "{open}<table><tr><td>{open}<table><tr><td>x</td></tr></table></div></td></tr></table></div>{open}<table><tr><td>open</div>",
            open = open
        )
    );
}

#[test]
fn test_prepare_plain_html_sanitizes_then_wraps() {
    assert_eq!(
        prepare_plain_html("<table onclick=x><tr><td>1</td></tr></table><script>x</script>"),
        "<div class=\"assistant-table-scroll-wrapper\"><table><tr><td>1</td></tr></table></div>"
    );
}

// --- Chart document ---

#[test]
fn test_chart_document_layout() {
    let doc = build_chart_document(CHART, 450.0, ChartKind::General);
    assert!(doc.starts_with("<!DOCTYPE html>"));
    assert!(doc.contains("<meta charset=\"utf-8\">"));
    assert!(doc.contains("height:450px!important"));
    assert!(doc.contains("padding-bottom:160px"));
    assert!(doc.contains("min-width:600px"));
    assert!(doc.contains("min-height:610px"));

    let error_at = doc.find("chart-script-error").unwrap();
    let chart_at = doc.find(CHART).unwrap();
    let height_at = doc.find("chart-height-report").unwrap();
    let export_at = doc.find("chart-export-request").unwrap();
    assert!(error_at < chart_at && chart_at < height_at && height_at < export_at);
}

#[test]
fn test_chart_document_clamps_height() {
    let low = build_chart_document(CHART, 100.0, ChartKind::General);
    assert!(low.contains("height:280px!important"));
    let high = build_chart_document(CHART, 5000.0, ChartKind::General);
    assert!(high.contains("height:1200px!important"));
    let pie = build_chart_document(PIE_CHART, 900.0, ChartKind::Pie);
    assert!(pie.contains("height:520px!important"));
    assert!(pie.contains("padding-bottom:80px"));
}

#[test]
fn test_chart_document_uses_wider_width_hint() {
    let html = r#"<div id="chart-w" style="min-width:900px;height:300px"></div><script>echarts.init(document.getElementById('chart-w'))</script>"#;
    let doc = build_chart_document(html, 300.0, ChartKind::General);
    assert!(doc.contains("min-width:900px"));
}

#[test]
fn test_rendered_blocks() {
    let html = format!("<p>A</p>{}<p>  </p>{}", CHART, PIE_CHART);
    let blocks = render_assistant_html(&html);
    assert_eq!(blocks.len(), 4);
    assert_eq!(
        blocks[0],
        RenderedBlock::Html {
            html: "<p>A</p>".to_string()
        }
    );
    match (&blocks[1], &blocks[3]) {
        (RenderedBlock::Chart(bar), RenderedBlock::Chart(pie)) => {
            assert_eq!(bar.kind, ChartKind::General);
            assert_eq!(bar.initial_height, 400);
            assert_eq!(pie.kind, ChartKind::Pie);
            assert_eq!(pie.initial_height, 520);
            assert_eq!(pie.sandbox(), IFRAME_SANDBOX);
        }
        other => panic!("unexpected blocks: {:?}", other),
    }
}

#[test]
fn test_plain_text_of_reply() {
    let html = format!("<p>Revenue grew</p>{}<ul><li>Q1</li><li>Q2</li></ul>", CHART);
    assert_eq!(extract_plain_text(&html), "Revenue grew\nQ1\nQ2");
}

// --- Bridge ---

#[test]
fn test_height_report_is_clamped() {
    let mut hub = BridgeHub::new();
    let frame = hub.mount(CHART);
    hub.render(frame).unwrap();
    assert_eq!(hub.frame(frame).unwrap().phase(), FramePhase::Loading);

    let event = hub.dispatch(frame, &json!({"type": "chart-height-report", "height": 5000}));
    assert_eq!(event, BridgeEvent::HeightChanged { frame, height: 1200 });
    assert_eq!(
        hub.frame(frame).unwrap().phase(),
        FramePhase::Reported { reports: 1 }
    );
}

#[test]
fn test_low_height_report_clamps_to_minimum() {
    let mut hub = BridgeHub::new();
    let frame = hub.mount(r#"<div id="chart-s" style="height:100px"></div><script>echarts.init(document.getElementById('chart-s'))</script>"#);
    assert_eq!(hub.frame(frame).unwrap().height(), 280);
    let event = hub.dispatch(frame, &json!({"type": "chart-height-report", "height": 100}));
    assert_eq!(event, BridgeEvent::HeightUnchanged { frame, height: 280 });
}

#[test]
fn test_height_only_grows() {
    let mut hub = BridgeHub::new();
    let frame = hub.mount(r#"<div id="chart-m" style="height:280px"></div><script>echarts.init(document.getElementById('chart-m'))</script>"#);
    for h in [300.0, 250.0, 500.0] {
        hub.dispatch(frame, &json!({"type": "chart-height-report", "height": h}));
    }
    let state = hub.frame(frame).unwrap();
    assert_eq!(state.height(), 500);
    assert_eq!(state.phase(), FramePhase::Reported { reports: 3 });
    assert!(state.document().contains("height:500px!important"));
}

#[test]
fn test_messages_are_routed_by_source() {
    let mut hub = BridgeHub::new();
    let a = hub.mount(CHART);
    let b = hub.mount(PIE_CHART);
    hub.dispatch(b, &json!({"type": "chart-height-report", "height": 700}));
    assert_eq!(hub.frame(a).unwrap().height(), 400);
    assert_eq!(hub.frame(b).unwrap().height(), 520);
}

#[test]
fn test_unrelated_messages_are_ignored() {
    let mut hub = BridgeHub::new();
    let frame = hub.mount(CHART);
    for data in [
        json!("chart-height-report"),
        json!({"type": "resize", "height": 900}),
        json!({"type": "chart-height-report"}),
        json!({"height": 900}),
    ] {
        assert_eq!(hub.dispatch(frame, &data), BridgeEvent::Ignored);
    }
    assert_eq!(hub.frame(frame).unwrap().height(), 400);
}

#[test]
fn test_script_errors_are_reported() {
    let mut hub = BridgeHub::new();
    let frame = hub.mount(CHART);
    let event = hub.dispatch(
        frame,
        &json!({"type": "chart-script-error", "error": "ReferenceError: echarts is not defined", "src": "", "line": 1, "col": 9}),
    );
    match event {
        BridgeEvent::ScriptError { frame: f, report } => {
            assert_eq!(f, frame);
            assert_eq!(report.error, "ReferenceError: echarts is not defined");
            assert_eq!(report.line, Some(1));
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

#[test]
fn test_export_round_trip() {
    let mut hub = BridgeHub::new();
    let frame = hub.mount(CHART);

    let result = json!({"type": "chart-export-result", "dataUrl": "data:image/png;base64,AAAA"});
    assert_eq!(hub.dispatch(frame, &result), BridgeEvent::Ignored);

    let request = hub.request_export(frame).unwrap();
    assert_eq!(request.to_value().unwrap(), json!({"type": "chart-export-request"}));
    assert_eq!(hub.frame(frame).unwrap().export_state(), ExportState::Pending);
    assert_eq!(
        hub.request_export(frame),
        Err(RenderError::ExportInFlight(frame))
    );

    assert_eq!(
        hub.dispatch(frame, &result),
        BridgeEvent::ExportResolved {
            frame,
            data_url: "data:image/png;base64,AAAA".to_string()
        }
    );
    assert_eq!(hub.frame(frame).unwrap().export_state(), ExportState::Idle);
    assert_eq!(hub.dispatch(frame, &result), BridgeEvent::Ignored);
}

#[test]
fn test_export_failure_and_cancel() {
    let mut hub = BridgeHub::new();
    let frame = hub.mount(CHART);
    hub.request_export(frame).unwrap();
    assert_eq!(
        hub.dispatch(frame, &json!({"type": "chart-export-result", "error": "Chart not found"})),
        BridgeEvent::ExportFailed {
            frame,
            reason: "Chart not found".to_string()
        }
    );

    hub.request_export(frame).unwrap();
    assert!(hub.cancel_export(frame));
    assert!(!hub.cancel_export(frame));
}

#[test]
fn test_unmounted_frames_are_ignored() {
    let mut hub = BridgeHub::new();
    let frame = hub.mount(CHART);
    let removed = hub.unmount(frame).unwrap();
    assert_eq!(removed.phase(), FramePhase::Unmounted);
    assert!(hub.is_empty());
    assert_eq!(
        hub.dispatch(frame, &json!({"type": "chart-height-report", "height": 900})),
        BridgeEvent::Ignored
    );
    assert_eq!(hub.request_export(frame), Err(RenderError::UnknownFrame(frame)));
}

#[test]
fn test_bridge_message_shapes() {
    let msg = BridgeMessage::parse(&json!({"type": "chart-script-error", "error": "boom"})).unwrap();
    assert_eq!(
        msg,
        BridgeMessage::ChartScriptError {
            error: "boom".to_string(),
            src: String::new(),
            line: None,
            col: None
        }
    );
    let msg = BridgeMessage::ChartExportResult {
        data_url: Some("data:image/png;base64,AA".to_string()),
        error: None,
    };
    assert_eq!(
        msg.to_value().unwrap(),
        json!({"type": "chart-export-result", "dataUrl": "data:image/png;base64,AA"})
    );
}
