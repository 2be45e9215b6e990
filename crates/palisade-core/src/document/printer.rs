//! Deterministic rendering of executable GraphQL documents.
//!
//! Signatures are computed over this form, so two sources that differ only
//! in formatting or comments must print byte-identically: fixed two-space
//! indentation, single separators, directive arguments sorted by name,
//! field order preserved as written, no comments or descriptions.

use graphql_parser::query::{
    Definition, Directive, Document, Field, FragmentDefinition, FragmentSpread, InlineFragment,
    Mutation, OperationDefinition, Query, Selection, SelectionSet, Subscription, Type,
    TypeCondition, Value, VariableDefinition,
};

/// Render a parsed document into its canonical textual form.
#[must_use]
pub fn canonical_print(document: &Document<'_, String>) -> String {
    let printed: Vec<String> = document.definitions.iter().map(print_definition).collect();
    let mut out = printed.join("\n\n");
    out.push('\n');
    out
}

fn print_definition(definition: &Definition<'_, String>) -> String {
    match definition {
        Definition::Operation(operation) => print_operation(operation),
        Definition::Fragment(fragment) => print_fragment(fragment),
    }
}

fn print_operation(operation: &OperationDefinition<'_, String>) -> String {
    match operation {
        OperationDefinition::SelectionSet(set) => print_selection_set(set, 0),
        OperationDefinition::Query(Query {
            name,
            variable_definitions,
            directives,
            selection_set,
            ..
        }) => {
            // The anonymous shorthand and `query { ... }` are the same
            // operation; both print as the bare selection set.
            if name.is_none() && variable_definitions.is_empty() && directives.is_empty() {
                print_selection_set(selection_set, 0)
            } else {
                print_keyed_operation(
                    "query",
                    name.as_deref(),
                    variable_definitions,
                    directives,
                    selection_set,
                )
            }
        },
        OperationDefinition::Mutation(Mutation {
            name,
            variable_definitions,
            directives,
            selection_set,
            ..
        }) => print_keyed_operation(
            "mutation",
            name.as_deref(),
            variable_definitions,
            directives,
            selection_set,
        ),
        OperationDefinition::Subscription(Subscription {
            name,
            variable_definitions,
            directives,
            selection_set,
            ..
        }) => print_keyed_operation(
            "subscription",
            name.as_deref(),
            variable_definitions,
            directives,
            selection_set,
        ),
    }
}

fn print_keyed_operation(
    keyword: &str,
    name: Option<&str>,
    variable_definitions: &[VariableDefinition<'_, String>],
    directives: &[Directive<'_, String>],
    selection_set: &SelectionSet<'_, String>,
) -> String {
    let mut out = String::from(keyword);
    if let Some(name) = name {
        out.push(' ');
        out.push_str(name);
    }
    if !variable_definitions.is_empty() {
        let rendered: Vec<String> = variable_definitions
            .iter()
            .map(print_variable_definition)
            .collect();
        out.push('(');
        out.push_str(&rendered.join(", "));
        out.push(')');
    }
    out.push_str(&print_directives(directives));
    out.push(' ');
    out.push_str(&print_selection_set(selection_set, 0));
    out
}

fn print_fragment(fragment: &FragmentDefinition<'_, String>) -> String {
    let TypeCondition::On(on_type) = &fragment.type_condition;
    let mut out = format!("fragment {} on {}", fragment.name, on_type);
    out.push_str(&print_directives(&fragment.directives));
    out.push(' ');
    out.push_str(&print_selection_set(&fragment.selection_set, 0));
    out
}

fn print_variable_definition(definition: &VariableDefinition<'_, String>) -> String {
    let mut out = format!("${}: {}", definition.name, print_type(&definition.var_type));
    if let Some(default) = &definition.default_value {
        out.push_str(" = ");
        out.push_str(&print_value(default));
    }
    out
}

fn print_selection_set(set: &SelectionSet<'_, String>, indent: usize) -> String {
    let pad = "  ".repeat(indent + 1);
    let mut out = String::from("{\n");
    for item in &set.items {
        out.push_str(&pad);
        out.push_str(&print_selection(item, indent + 1));
        out.push('\n');
    }
    out.push_str(&"  ".repeat(indent));
    out.push('}');
    out
}

fn print_selection(selection: &Selection<'_, String>, indent: usize) -> String {
    match selection {
        Selection::Field(field) => print_field(field, indent),
        Selection::FragmentSpread(spread) => print_fragment_spread(spread),
        Selection::InlineFragment(fragment) => print_inline_fragment(fragment, indent),
    }
}

fn print_field(field: &Field<'_, String>, indent: usize) -> String {
    let mut out = String::new();
    if let Some(alias) = &field.alias {
        out.push_str(alias);
        out.push_str(": ");
    }
    out.push_str(&field.name);
    out.push_str(&print_arguments(&field.arguments));
    out.push_str(&print_directives(&field.directives));
    if !field.selection_set.items.is_empty() {
        out.push(' ');
        out.push_str(&print_selection_set(&field.selection_set, indent));
    }
    out
}

fn print_fragment_spread(spread: &FragmentSpread<'_, String>) -> String {
    let mut out = format!("...{}", spread.fragment_name);
    out.push_str(&print_directives(&spread.directives));
    out
}

fn print_inline_fragment(fragment: &InlineFragment<'_, String>, indent: usize) -> String {
    let mut out = String::from("...");
    if let Some(TypeCondition::On(on_type)) = &fragment.type_condition {
        out.push_str(" on ");
        out.push_str(on_type);
    }
    out.push_str(&print_directives(&fragment.directives));
    out.push(' ');
    out.push_str(&print_selection_set(&fragment.selection_set, indent));
    out
}

/// Field arguments keep their written order.
fn print_arguments(arguments: &[(String, Value<'_, String>)]) -> String {
    if arguments.is_empty() {
        return String::new();
    }
    let rendered: Vec<String> = arguments
        .iter()
        .map(|(name, value)| format!("{name}: {}", print_value(value)))
        .collect();
    format!("({})", rendered.join(", "))
}

/// Directive arguments are sorted by name so that argument order never
/// changes the signature.
fn print_directives(directives: &[Directive<'_, String>]) -> String {
    let mut out = String::new();
    for directive in directives {
        out.push_str(" @");
        out.push_str(&directive.name);
        if !directive.arguments.is_empty() {
            let mut arguments: Vec<&(String, Value<'_, String>)> =
                directive.arguments.iter().collect();
            arguments.sort_by(|a, b| a.0.cmp(&b.0));
            let rendered: Vec<String> = arguments
                .iter()
                .map(|(name, value)| format!("{name}: {}", print_value(value)))
                .collect();
            out.push('(');
            out.push_str(&rendered.join(", "));
            out.push(')');
        }
    }
    out
}

fn print_type(ty: &Type<'_, String>) -> String {
    match ty {
        Type::NamedType(name) => name.clone(),
        Type::ListType(inner) => format!("[{}]", print_type(inner)),
        Type::NonNullType(inner) => format!("{}!", print_type(inner)),
    }
}

fn print_value(value: &Value<'_, String>) -> String {
    match value {
        Value::Variable(name) => format!("${name}"),
        Value::Int(number) => number.as_i64().unwrap_or_default().to_string(),
        Value::Float(number) => number.to_string(),
        Value::String(text) => print_string(text),
        Value::Boolean(boolean) => boolean.to_string(),
        Value::Null => "null".to_string(),
        Value::Enum(name) => name.clone(),
        Value::List(items) => {
            let rendered: Vec<String> = items.iter().map(print_value).collect();
            format!("[{}]", rendered.join(", "))
        },
        Value::Object(fields) => {
            // BTreeMap iteration is name-ordered, which keeps object
            // literals stable regardless of written order.
            let rendered: Vec<String> = fields
                .iter()
                .map(|(name, value)| format!("{name}: {}", print_value(value)))
                .collect();
            format!("{{{}}}", rendered.join(", "))
        },
    }
}

fn print_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}
