//! Goal planning
//!
//! A goal amount in the query records a new goal on the session. The goal
//! parameters, plus a naive monthly savings figure, go into the context.

use crate::handlers::{format_money, generate_answer, Handler, HandlerOutcome, HandlerRequest};
use crate::llm::TextGenerator;
use crate::models::{Goal, IntentKind};
use crate::rag::{ContextBlock, StructuredData};
use crate::Result;
use async_trait::async_trait;

const GUIDANCE: &str = "Role: financial goal planner.
- Tailor the plan to the stated amount, timeframe and risk tolerance
- Mention an emergency fund and regular contributions
- Suggest an appropriate time horizon when none is given
- Include a brief risk disclaimer";

pub struct GoalPlanningHandler {
    generator: TextGenerator,
}

impl GoalPlanningHandler {
    pub fn new(generator: TextGenerator) -> Self {
        Self { generator }
    }
}

fn describe_goal(goal: &Goal) -> String {
    let mut lines = vec![
        format!("Goal type: {}", goal.goal_type),
        format!("Target amount: ${}", format_money(goal.target_amount)),
    ];
    if let Some(months) = goal.timeframe_months {
        lines.push(format!("Timeframe: {} months", months));
        if months > 0 {
            lines.push(format!(
                "Saving without growth needs about ${} per month",
                format_money(goal.target_amount / months as f64)
            ));
        }
    }
    if let Some(risk) = goal.risk_tolerance {
        lines.push(format!("Risk tolerance: {}", risk));
    }
    lines.join("\n")
}

#[async_trait]
impl Handler for GoalPlanningHandler {
    fn kind(&self) -> IntentKind {
        IntentKind::GoalPlanning
    }

    fn retrieval_focus(&self) -> Option<&str> {
        Some("goal setting financial planning retirement investment strategy")
    }

    async fn gather(&self, request: &HandlerRequest<'_>) -> Result<Vec<StructuredData>> {
        let mut data = Vec::new();

        if let Some(goal) = Goal::from_parameters(&request.intent.parameters).transpose()? {
            data.push(StructuredData::new("New goal", describe_goal(&goal)));
        }

        let existing = request.session.goals();
        if !existing.is_empty() {
            let body = existing
                .iter()
                .enumerate()
                .map(|(i, g)| format!("{}. {}", i + 1, describe_goal(g).replace('\n', "; ")))
                .collect::<Vec<_>>()
                .join("\n");
            data.push(StructuredData::new("Existing goals", body));
        }

        Ok(data)
    }

    async fn handle(
        &self,
        request: &HandlerRequest<'_>,
        context: &ContextBlock,
    ) -> Result<HandlerOutcome> {
        let new_goal = Goal::from_parameters(&request.intent.parameters).transpose()?;
        let text = generate_answer(&self.generator, GUIDANCE, request.query, context).await?;

        let mut outcome = HandlerOutcome::text(text);
        outcome.update.new_goal = new_goal;
        Ok(outcome)
    }
}
