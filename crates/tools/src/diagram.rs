//! Diagram tools: flowcharts, timelines, org charts and mind maps as
//! standalone SVG documents. Layout is computed in-crate; there is no
//! external renderer.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use cf_domain::error::{Error, Result};
use cf_domain::tool::ToolResult;
use cf_media::fsops::StagedOutput;

use crate::args::*;
use crate::registry::ToolRegistry;
use crate::video::register_tool_fn;
use crate::{tool_def, ToolDeps};

const NODE_W: i64 = 180;
const NODE_H: i64 = 48;
const GAP_Y: i64 = 60;
const MARGIN: i64 = 40;

pub fn register(registry: &mut ToolRegistry, deps: &Arc<ToolDeps>) -> Result<()> {
    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "generate_flowchart",
            "Render a flowchart (nodes + directed edges) to an SVG file.",
            json!({
                "type": "object",
                "properties": {
                    "output": { "type": "string" },
                    "nodes": {
                        "type": "array",
                        "minItems": 1,
                        "items": {
                            "type": "object",
                            "properties": {
                                "id": { "type": "string" },
                                "label": { "type": "string" }
                            },
                            "required": ["id", "label"]
                        }
                    },
                    "edges": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "from": { "type": "string" },
                                "to": { "type": "string" },
                                "label": { "type": "string" }
                            },
                            "required": ["from", "to"]
                        }
                    }
                },
                "required": ["output", "nodes"]
            })
        ),
        generate_flowchart
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "generate_timeline_diagram",
            "Render a horizontal timeline of labelled events to an SVG file.",
            json!({
                "type": "object",
                "properties": {
                    "output": { "type": "string" },
                    "events": {
                        "type": "array",
                        "minItems": 1,
                        "items": {
                            "type": "object",
                            "properties": {
                                "time": { "type": "string" },
                                "label": { "type": "string" }
                            },
                            "required": ["time", "label"]
                        }
                    },
                    "title": { "type": "string" }
                },
                "required": ["output", "events"]
            })
        ),
        generate_timeline_diagram
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "generate_org_chart",
            "Render an organization chart from a nested tree to an SVG file.",
            json!({
                "type": "object",
                "properties": {
                    "output": { "type": "string" },
                    "root": {
                        "type": "object",
                        "properties": {
                            "name": { "type": "string" },
                            "title": { "type": "string" },
                            "children": { "type": "array" }
                        },
                        "required": ["name"]
                    }
                },
                "required": ["output", "root"]
            })
        ),
        generate_org_chart
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "generate_mind_map",
            "Render a mind map (center topic with radiating branches) to an SVG file.",
            json!({
                "type": "object",
                "properties": {
                    "output": { "type": "string" },
                    "center": { "type": "string" },
                    "branches": {
                        "type": "array",
                        "minItems": 1,
                        "items": {
                            "type": "object",
                            "properties": {
                                "label": { "type": "string" },
                                "children": { "type": "array", "items": { "type": "string" } }
                            },
                            "required": ["label"]
                        }
                    }
                },
                "required": ["output", "center", "branches"]
            })
        ),
        generate_mind_map
    );

    Ok(())
}

fn write_svg(output_arg: &Value, svg: String, what: &str) -> Result<ToolResult> {
    let output = std::path::PathBuf::from(req_str(output_arg, "output")?);
    let stage = StagedOutput::new(&output)?;
    std::fs::write(stage.path(), svg.as_bytes())?;
    let committed = stage.commit()?;
    Ok(ToolResult::ok(format!("{what} -> {}", committed.display())))
}

fn esc(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn svg_header(width: i64, height: i64) -> String {
    format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{width}\" height=\"{height}\" \
         viewBox=\"0 0 {width} {height}\" font-family=\"sans-serif\" font-size=\"14\">\n\
         <rect width=\"100%\" height=\"100%\" fill=\"white\"/>\n"
    )
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Flowchart
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn generate_flowchart(
    _deps: Arc<ToolDeps>,
    args: Value,
    _cancel: CancellationToken,
) -> Result<ToolResult> {
    let nodes = args["nodes"].as_array().cloned().unwrap_or_default();
    let edges = args["edges"].as_array().cloned().unwrap_or_default();
    let svg = flowchart_svg(&nodes, &edges)?;
    write_svg(&args, svg, "Flowchart")
}

pub(crate) fn flowchart_svg(nodes: &[Value], edges: &[Value]) -> Result<String> {
    // Vertical ladder layout: node i at row i.
    let mut positions = std::collections::HashMap::new();
    for (i, node) in nodes.iter().enumerate() {
        let id = node["id"]
            .as_str()
            .ok_or_else(|| Error::SchemaViolation("node missing id".into()))?;
        let x = MARGIN + 120;
        let y = MARGIN + i as i64 * (NODE_H + GAP_Y);
        positions.insert(id.to_string(), (x, y));
    }

    let width = MARGIN * 2 + 120 + NODE_W + 120;
    let height = MARGIN * 2 + nodes.len() as i64 * (NODE_H + GAP_Y);
    let mut svg = svg_header(width, height);
    svg.push_str(
        "<defs><marker id=\"arrow\" viewBox=\"0 0 10 10\" refX=\"9\" refY=\"5\" \
         markerWidth=\"7\" markerHeight=\"7\" orient=\"auto-start-reverse\">\
         <path d=\"M 0 0 L 10 5 L 0 10 z\" fill=\"#444\"/></marker></defs>\n",
    );

    for edge in edges {
        let from = edge["from"].as_str().unwrap_or_default();
        let to = edge["to"].as_str().unwrap_or_default();
        let (Some(&(x1, y1)), Some(&(x2, y2))) = (positions.get(from), positions.get(to)) else {
            return Err(Error::SchemaViolation(format!(
                "edge references unknown node: {from} -> {to}"
            )));
        };
        let (sx, sy) = (x1 + NODE_W / 2, y1 + NODE_H);
        let (ex, ey) = (x2 + NODE_W / 2, y2);
        svg.push_str(&format!(
            "<line x1=\"{sx}\" y1=\"{sy}\" x2=\"{ex}\" y2=\"{ey}\" stroke=\"#444\" \
             stroke-width=\"1.5\" marker-end=\"url(#arrow)\"/>\n"
        ));
        if let Some(label) = edge["label"].as_str() {
            svg.push_str(&format!(
                "<text x=\"{}\" y=\"{}\" fill=\"#666\" font-size=\"12\">{}</text>\n",
                (sx + ex) / 2 + 8,
                (sy + ey) / 2,
                esc(label)
            ));
        }
    }

    for node in nodes {
        let id = node["id"].as_str().unwrap_or_default();
        let label = node["label"].as_str().unwrap_or(id);
        let &(x, y) = &positions[id];
        svg.push_str(&format!(
            "<rect x=\"{x}\" y=\"{y}\" width=\"{NODE_W}\" height=\"{NODE_H}\" rx=\"8\" \
             fill=\"#eef2ff\" stroke=\"#4455aa\"/>\n\
             <text x=\"{}\" y=\"{}\" text-anchor=\"middle\" dominant-baseline=\"middle\">{}</text>\n",
            x + NODE_W / 2,
            y + NODE_H / 2,
            esc(label)
        ));
    }

    svg.push_str("</svg>\n");
    Ok(svg)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Timeline
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn generate_timeline_diagram(
    _deps: Arc<ToolDeps>,
    args: Value,
    _cancel: CancellationToken,
) -> Result<ToolResult> {
    let events = args["events"].as_array().cloned().unwrap_or_default();
    let title = args["title"].as_str().unwrap_or("");

    let spacing = 180_i64;
    let width = MARGIN * 2 + spacing * (events.len().max(1) as i64 - 1) + 160;
    let height = 220_i64;
    let axis_y = 120_i64;

    let mut svg = svg_header(width, height);
    if !title.is_empty() {
        svg.push_str(&format!(
            "<text x=\"{}\" y=\"36\" text-anchor=\"middle\" font-size=\"18\" font-weight=\"bold\">{}</text>\n",
            width / 2,
            esc(title)
        ));
    }
    svg.push_str(&format!(
        "<line x1=\"{MARGIN}\" y1=\"{axis_y}\" x2=\"{}\" y2=\"{axis_y}\" stroke=\"#444\" stroke-width=\"2\"/>\n",
        width - MARGIN
    ));

    for (i, event) in events.iter().enumerate() {
        let x = MARGIN + 80 + i as i64 * spacing;
        let time = event["time"].as_str().unwrap_or_default();
        let label = event["label"].as_str().unwrap_or_default();
        // Alternate labels above and below the axis.
        let above = i % 2 == 0;
        let label_y = if above { axis_y - 40 } else { axis_y + 52 };
        svg.push_str(&format!(
            "<circle cx=\"{x}\" cy=\"{axis_y}\" r=\"6\" fill=\"#4455aa\"/>\n\
             <text x=\"{x}\" y=\"{}\" text-anchor=\"middle\" font-size=\"12\" fill=\"#666\">{}</text>\n\
             <text x=\"{x}\" y=\"{label_y}\" text-anchor=\"middle\">{}</text>\n",
            if above { axis_y - 20 } else { axis_y + 28 },
            esc(time),
            esc(label)
        ));
    }

    svg.push_str("</svg>\n");
    write_svg(&args, svg, "Timeline diagram")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Org chart
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn generate_org_chart(
    _deps: Arc<ToolDeps>,
    args: Value,
    _cancel: CancellationToken,
) -> Result<ToolResult> {
    let root = &args["root"];
    let mut rows: Vec<Vec<(String, String)>> = Vec::new();
    collect_levels(root, 0, &mut rows)?;

    let widest = rows.iter().map(Vec::len).max().unwrap_or(1) as i64;
    let width = MARGIN * 2 + widest * (NODE_W + 20);
    let height = MARGIN * 2 + rows.len() as i64 * (NODE_H + GAP_Y);

    let mut svg = svg_header(width, height);
    for (level, row) in rows.iter().enumerate() {
        let y = MARGIN + level as i64 * (NODE_H + GAP_Y);
        let row_w = row.len() as i64 * (NODE_W + 20);
        let x0 = (width - row_w) / 2;
        for (i, (name, title)) in row.iter().enumerate() {
            let x = x0 + i as i64 * (NODE_W + 20);
            svg.push_str(&format!(
                "<rect x=\"{x}\" y=\"{y}\" width=\"{NODE_W}\" height=\"{NODE_H}\" rx=\"6\" \
                 fill=\"#f0fdf4\" stroke=\"#15803d\"/>\n\
                 <text x=\"{}\" y=\"{}\" text-anchor=\"middle\" font-weight=\"bold\">{}</text>\n",
                x + NODE_W / 2,
                y + 20,
                esc(name)
            ));
            if !title.is_empty() {
                svg.push_str(&format!(
                    "<text x=\"{}\" y=\"{}\" text-anchor=\"middle\" font-size=\"12\" fill=\"#666\">{}</text>\n",
                    x + NODE_W / 2,
                    y + 38,
                    esc(title)
                ));
            }
        }
    }

    svg.push_str("</svg>\n");
    write_svg(&args, svg, "Org chart")
}

fn collect_levels(
    node: &Value,
    level: usize,
    rows: &mut Vec<Vec<(String, String)>>,
) -> Result<()> {
    let name = node["name"]
        .as_str()
        .ok_or_else(|| Error::SchemaViolation("org chart node missing name".into()))?;
    let title = node["title"].as_str().unwrap_or_default();
    if rows.len() <= level {
        rows.push(Vec::new());
    }
    rows[level].push((name.to_string(), title.to_string()));
    if let Some(children) = node["children"].as_array() {
        for child in children {
            collect_levels(child, level + 1, rows)?;
        }
    }
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Mind map
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn generate_mind_map(
    _deps: Arc<ToolDeps>,
    args: Value,
    _cancel: CancellationToken,
) -> Result<ToolResult> {
    let center = req_str(&args, "center")?;
    let branches = args["branches"].as_array().cloned().unwrap_or_default();

    let size = 720_i64;
    let cx = size / 2;
    let cy = size / 2;
    let radius = 220.0_f64;

    let mut svg = svg_header(size, size);
    let n = branches.len().max(1);
    for (i, branch) in branches.iter().enumerate() {
        let angle = (i as f64 / n as f64) * std::f64::consts::TAU - std::f64::consts::FRAC_PI_2;
        let bx = cx as f64 + radius * angle.cos();
        let by = cy as f64 + radius * angle.sin();
        let label = branch["label"].as_str().unwrap_or_default();

        svg.push_str(&format!(
            "<line x1=\"{cx}\" y1=\"{cy}\" x2=\"{bx:.0}\" y2=\"{by:.0}\" stroke=\"#999\"/>\n\
             <ellipse cx=\"{bx:.0}\" cy=\"{by:.0}\" rx=\"80\" ry=\"26\" fill=\"#fef9c3\" stroke=\"#a16207\"/>\n\
             <text x=\"{bx:.0}\" y=\"{by:.0}\" text-anchor=\"middle\" dominant-baseline=\"middle\">{}</text>\n",
            esc(label)
        ));

        if let Some(children) = branch["children"].as_array() {
            for (j, child) in children.iter().enumerate() {
                let child_label = child.as_str().unwrap_or_default();
                let spread = (j as f64 - (children.len() as f64 - 1.0) / 2.0) * 0.35;
                let cr = radius + 130.0;
                let ca = angle + spread * 0.5;
                let cx2 = cx as f64 + cr * ca.cos();
                let cy2 = cy as f64 + cr * ca.sin();
                svg.push_str(&format!(
                    "<line x1=\"{bx:.0}\" y1=\"{by:.0}\" x2=\"{cx2:.0}\" y2=\"{cy2:.0}\" stroke=\"#ccc\"/>\n\
                     <text x=\"{cx2:.0}\" y=\"{cy2:.0}\" text-anchor=\"middle\" font-size=\"12\">{}</text>\n",
                    esc(child_label)
                ));
            }
        }
    }

    svg.push_str(&format!(
        "<ellipse cx=\"{cx}\" cy=\"{cy}\" rx=\"100\" ry=\"34\" fill=\"#e0e7ff\" stroke=\"#3730a3\" stroke-width=\"2\"/>\n\
         <text x=\"{cx}\" y=\"{cy}\" text-anchor=\"middle\" dominant-baseline=\"middle\" font-weight=\"bold\">{}</text>\n",
        esc(center)
    ));
    svg.push_str("</svg>\n");
    write_svg(&args, svg, "Mind map")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flowchart_renders_nodes_and_arrows() {
        let nodes = vec![
            json!({"id": "a", "label": "Start"}),
            json!({"id": "b", "label": "Finish"}),
        ];
        let edges = vec![json!({"from": "a", "to": "b", "label": "next"})];
        let svg = flowchart_svg(&nodes, &edges).unwrap();
        assert!(svg.contains("Start"));
        assert!(svg.contains("marker-end=\"url(#arrow)\""));
        assert!(svg.contains("next"));
        assert!(svg.starts_with("<svg"));
        assert!(svg.trim_end().ends_with("</svg>"));
    }

    #[test]
    fn flowchart_rejects_dangling_edges() {
        let nodes = vec![json!({"id": "a", "label": "A"})];
        let edges = vec![json!({"from": "a", "to": "ghost"})];
        assert!(flowchart_svg(&nodes, &edges).is_err());
    }

    #[test]
    fn labels_are_xml_escaped() {
        let nodes = vec![json!({"id": "a", "label": "a < b & c"})];
        let svg = flowchart_svg(&nodes, &[]).unwrap();
        assert!(svg.contains("a &lt; b &amp; c"));
    }
}
