//! SCPD (service control protocol description) parsing.

use crate::model::{Action, Argument, DataType};
use crate::quirks::TagMatch;
use crate::xml::{self, Element};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Actions and state variable types of one service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ScpdTable {
    pub actions: Vec<Action>,
    pub state_variables: BTreeMap<String, DataType>,
}

/// A declared argument before its data type is resolved.
struct RawArgument {
    name: String,
    direction: String,
    related_state_variable: String,
}

struct RawAction {
    name: String,
    arguments: Vec<RawArgument>,
}

/// Parse an SCPD document, strictly first and tolerantly on failure.
///
/// The root element must be `scpd` under `fallback`, whichever parse succeeds.
pub(crate) fn parse_scpd(body: &str, fallback: TagMatch) -> Result<ScpdTable, String> {
    let root_name = xml::root_name(body)?;
    if !fallback.matches(&root_name, "scpd") {
        return Err(format!("root element is <{root_name}>, not <scpd>"));
    }

    let (actions, variables) = match quick_xml::de::from_str::<ScpdXml>(body) {
        Ok(scpd) => scpd.into_raw(),
        Err(strict) => {
            tracing::warn!(error = %strict, "strict SCPD parse failed, retrying tolerantly");
            let root = xml::parse(body)?;
            raw_from_element(&root, fallback)
        }
    };

    let state_variables: BTreeMap<String, DataType> = variables
        .into_iter()
        .map(|(name, data_type)| (name, DataType::parse(&data_type)))
        .collect();

    let actions = actions
        .into_iter()
        .map(|raw| resolve_action(raw, &state_variables))
        .collect();

    Ok(ScpdTable {
        actions,
        state_variables,
    })
}

fn resolve_action(raw: RawAction, state_variables: &BTreeMap<String, DataType>) -> Action {
    let mut action = Action {
        name: raw.name,
        ..Default::default()
    };
    for arg in raw.arguments {
        let data_type = state_variables
            .get(&arg.related_state_variable)
            .cloned()
            .unwrap_or_default();
        let argument = Argument {
            name: arg.name,
            related_state_variable: arg.related_state_variable,
            data_type,
        };
        if arg.direction.eq_ignore_ascii_case("out") {
            action.outputs.push(argument);
        } else {
            action.inputs.push(argument);
        }
    }
    action
}

fn raw_from_element(root: &Element, rule: TagMatch) -> (Vec<RawAction>, Vec<(String, String)>) {
    let text = |element: &Element, name: &str| {
        element
            .child_text(name, rule)
            .unwrap_or_default()
            .to_string()
    };

    let actions = root
        .child("actionList", rule)
        .map(|list| {
            list.children_named("action", rule)
                .map(|action| RawAction {
                    name: text(action, "name"),
                    arguments: action
                        .child("argumentList", rule)
                        .map(|args| {
                            args.children_named("argument", rule)
                                .map(|arg| RawArgument {
                                    name: text(arg, "name"),
                                    direction: text(arg, "direction"),
                                    related_state_variable: text(arg, "relatedStateVariable"),
                                })
                                .collect()
                        })
                        .unwrap_or_default(),
                })
                .collect()
        })
        .unwrap_or_default();

    let variables = root
        .child("serviceStateTable", rule)
        .map(|table| {
            table
                .children_named("stateVariable", rule)
                .map(|var| (text(var, "name"), text(var, "dataType")))
                .collect()
        })
        .unwrap_or_default();

    (actions, variables)
}

#[derive(Debug, Deserialize)]
struct ScpdXml {
    #[serde(rename = "actionList", default)]
    action_list: ActionListXml,
    #[serde(rename = "serviceStateTable")]
    state_table: StateTableXml,
}

#[derive(Debug, Default, Deserialize)]
struct ActionListXml {
    #[serde(default)]
    action: Vec<ActionXml>,
}

#[derive(Debug, Deserialize)]
struct ActionXml {
    name: String,
    #[serde(rename = "argumentList", default)]
    argument_list: ArgumentListXml,
}

#[derive(Debug, Default, Deserialize)]
struct ArgumentListXml {
    #[serde(default)]
    argument: Vec<ArgumentXml>,
}

#[derive(Debug, Deserialize)]
struct ArgumentXml {
    name: String,
    #[serde(default)]
    direction: String,
    #[serde(rename = "relatedStateVariable", default)]
    related_state_variable: String,
}

#[derive(Debug, Default, Deserialize)]
struct StateTableXml {
    #[serde(rename = "stateVariable", default)]
    state_variable: Vec<StateVariableXml>,
}

#[derive(Debug, Deserialize)]
struct StateVariableXml {
    name: String,
    #[serde(rename = "dataType", default)]
    data_type: String,
}

impl ScpdXml {
    fn into_raw(self) -> (Vec<RawAction>, Vec<(String, String)>) {
        let actions = self
            .action_list
            .action
            .into_iter()
            .map(|action| RawAction {
                name: action.name.trim().to_string(),
                arguments: action
                    .argument_list
                    .argument
                    .into_iter()
                    .map(|arg| RawArgument {
                        name: arg.name.trim().to_string(),
                        direction: arg.direction.trim().to_string(),
                        related_state_variable: arg.related_state_variable.trim().to_string(),
                    })
                    .collect(),
            })
            .collect();
        let variables = self
            .state_table
            .state_variable
            .into_iter()
            .map(|var| (var.name.trim().to_string(), var.data_type))
            .collect();
        (actions, variables)
    }
}
