use crate::output::{print_json, print_table};
use flowdeck_core::graph::StepGraph;
use flowdeck_core::params::{Param, Params, Source};
use serde::Serialize;

#[derive(Serialize)]
struct OperationRow<'a> {
    name: &'a str,
    description: &'a str,
    component: Option<&'a str>,
    requires: &'a [&'static str],
}

#[derive(Serialize)]
struct ParamRow {
    name: &'static str,
    value: String,
    source: Source,
    optional: bool,
    description: &'static str,
}

#[derive(Serialize)]
struct HelpOutput<'a> {
    operations: Vec<OperationRow<'a>>,
    parameters: Vec<ParamRow>,
}

fn display_value(params: &Params, param: Param) -> String {
    match params.optional(param) {
        None => "(unset)".to_string(),
        Some(_) if param.is_secret() => "****".to_string(),
        Some(v) => v.to_string(),
    }
}

pub fn run(graph: &StepGraph, params: &Params, json: bool) -> anyhow::Result<()> {
    let operations: Vec<OperationRow> = graph
        .steps()
        .iter()
        .map(|s| OperationRow {
            name: s.name,
            description: s.description,
            component: s.component.map(|c| c.as_str()),
            requires: &s.prerequisites,
        })
        .collect();
    let parameters: Vec<ParamRow> = Param::all()
        .iter()
        .map(|&p| ParamRow {
            name: p.as_str(),
            value: display_value(params, p),
            source: params.source(p),
            optional: p.is_optional(),
            description: p.spec().description,
        })
        .collect();

    if json {
        return print_json(&HelpOutput {
            operations,
            parameters,
        });
    }

    println!("Usage: flowdeck [OPTIONS] [TARGET | NAME=VALUE]...\n");
    let rows: Vec<Vec<String>> = operations
        .iter()
        .map(|o| {
            vec![
                o.name.to_string(),
                o.component.unwrap_or("-").to_string(),
                o.description.to_string(),
            ]
        })
        .collect();
    print_table(&["OPERATION", "COMPONENT", "DESCRIPTION"], &rows);

    println!();
    let rows: Vec<Vec<String>> = parameters
        .iter()
        .map(|p| {
            let source = match p.source {
                Source::Override => "override",
                Source::Env => "env",
                Source::Settings => "flowdeck.yaml",
                Source::Default => "default",
            };
            vec![p.name.to_string(), p.value.clone(), source.to_string()]
        })
        .collect();
    print_table(&["PARAMETER", "VALUE", "SOURCE"], &rows);
    Ok(())
}
