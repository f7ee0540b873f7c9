use std::collections::HashMap;

use serde::Serialize;
use serde_json::{json, Value};

use actgate_core::domain::action::ActionType;

/// Function declaration offered to the model. The model only ever gets to
/// name one of these; it never executes anything itself.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDefinition {
    fn new(action_type: ActionType, description: &str, properties: Value, required: &[&str]) -> Self {
        Self {
            name: action_type.as_str().to_string(),
            description: description.to_string(),
            parameters: json!({
                "type": "object",
                "properties": properties,
                "required": required,
            }),
        }
    }

    pub fn action_type(&self) -> ActionType {
        ActionType::parse(&self.name)
    }

    pub fn required_fields(&self) -> Vec<&str> {
        self.parameters["required"]
            .as_array()
            .map(|fields| fields.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

pub struct ToolRegistry {
    tools: HashMap<String, ToolDefinition>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        let mut registry = Self { tools: HashMap::new() };
        for definition in builtin_definitions() {
            registry.register(definition);
        }
        registry
    }
}

impl ToolRegistry {
    pub fn empty() -> Self {
        Self { tools: HashMap::new() }
    }

    pub fn register(&mut self, definition: ToolDefinition) {
        self.tools.insert(definition.name.clone(), definition);
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name)
    }

    /// Sorted by name so the declaration sent to the model is stable.
    pub fn definitions(&self) -> Vec<&ToolDefinition> {
        let mut definitions: Vec<_> = self.tools.values().collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

fn builtin_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::new(
            ActionType::MarkHabitComplete,
            "Mark one of the user's habits as done for a day.",
            json!({
                "habit_id": {"type": "string"},
                "completed_on": {"type": "string", "description": "ISO date, defaults to today"}
            }),
            &["habit_id"],
        ),
        ToolDefinition::new(
            ActionType::CreateTask,
            "Add a task to the user's task list.",
            json!({
                "title": {"type": "string"},
                "due_date": {"type": "string"},
                "notes": {"type": "string"}
            }),
            &["title"],
        ),
        ToolDefinition::new(
            ActionType::UpdateGoalProgress,
            "Record progress on an existing goal as a percentage.",
            json!({
                "goal_id": {"type": "string"},
                "progress": {"type": "number", "minimum": 0, "maximum": 100},
                "note": {"type": "string"}
            }),
            &["goal_id", "progress"],
        ),
        ToolDefinition::new(
            ActionType::CreateGoal,
            "Create a new goal for the user.",
            json!({
                "title": {"type": "string"},
                "target_date": {"type": "string"},
                "description": {"type": "string"}
            }),
            &["title"],
        ),
        ToolDefinition::new(
            ActionType::CreateHabit,
            "Start tracking a new habit.",
            json!({
                "name": {"type": "string"},
                "frequency": {"type": "string", "enum": ["daily", "weekly", "monthly"]}
            }),
            &["name"],
        ),
        ToolDefinition::new(
            ActionType::CreateCalendarEvent,
            "Put an event on the user's calendar.",
            json!({
                "title": {"type": "string"},
                "start_time": {"type": "string", "description": "RFC 3339 timestamp"},
                "end_time": {"type": "string"},
                "location": {"type": "string"},
                "attendees": {"type": "array", "items": {"type": "string"}}
            }),
            &["title", "start_time"],
        ),
        ToolDefinition::new(
            ActionType::SendEmail,
            "Send an email on the user's behalf. Always requires confirmation.",
            json!({
                "to": {"type": "string"},
                "subject": {"type": "string"},
                "body": {"type": "string"}
            }),
            &["to", "subject", "body"],
        ),
        ToolDefinition::new(
            ActionType::SendSms,
            "Send a text message on the user's behalf. Always requires confirmation.",
            json!({
                "to": {"type": "string", "description": "Phone number"},
                "message": {"type": "string"}
            }),
            &["to", "message"],
        ),
        ToolDefinition::new(
            ActionType::MakeVoiceCall,
            "Place an automated phone call on the user's behalf.",
            json!({
                "to": {"type": "string", "description": "Phone number"},
                "purpose": {"type": "string"},
                "script": {"type": "string"}
            }),
            &["to", "purpose"],
        ),
    ]
}
