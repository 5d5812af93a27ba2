//! Reasoning patterns for structured agent prompting.
//!
//! Each pattern is a deterministic prompt rewriter: a fixed preamble plus a
//! format expectation, applied before model invocation. Patterns perform no
//! I/O and hold no state.

use serde::{Deserialize, Serialize};

/// Named prompt transformations applied before model invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningPattern {
    /// Step-by-step reasoning before the final answer
    ChainOfThought,
    /// Interleaved Thought/Action/Observation scaffold for tool use
    React,
    /// Enumerate candidate approaches, evaluate, pick the best
    TreeOfThought,
    /// Initial answer, self-critique, revised answer
    Reflection,
    /// Emit a numbered plan first, then execute it
    PlanAndSolve,
}

const CHAIN_OF_THOUGHT_PREAMBLE: &str = "\
Let's approach this step-by-step:

1. First, understand the problem clearly
2. Break down the problem into smaller parts
3. Solve each part systematically
4. Combine the solutions
5. Verify the final answer

Think through each step carefully before providing your final answer.";

const REACT_PREAMBLE: &str = "\
Use the following format:

Thought: Consider what you need to do
Action: The action to take
Observation: What you observe from the action
... (repeat Thought/Action/Observation as needed)
Thought: I now know the final answer
Final Answer: The final answer to the original question

Begin!";

const TREE_OF_THOUGHT_PREAMBLE: &str = "\
Explore multiple approaches to solve this problem:

For each approach:
1. Describe the approach
2. List pros and cons
3. Evaluate feasibility (score 1-10)

After exploring all approaches, select the best one and provide the solution.";

const REFLECTION_PREAMBLE: &str = "\
Solve the problem, then reflect on your solution:

1. Initial Solution: Provide your first answer
2. Reflection: Critique your solution - what could be wrong or improved?
3. Refined Solution: Provide an improved answer based on your reflection

Be critical and thorough in your reflection.";

const PLAN_AND_SOLVE_PREAMBLE: &str = "\
Follow this two-phase approach:

Phase 1 - Planning:
- Understand the problem requirements
- Identify key information and constraints
- Create a step-by-step plan

Phase 2 - Execution:
- Execute each step of your plan
- Show your work for each step
- Verify the solution

Provide both your plan and execution clearly.";

impl ReasoningPattern {
    /// Rewrite a prompt with this pattern's preamble and format expectation.
    #[must_use]
    pub fn apply(&self, prompt: &str) -> String {
        match self {
            Self::ChainOfThought => format!(
                "{CHAIN_OF_THOUGHT_PREAMBLE}\n\n{prompt}\n\nProvide your step-by-step reasoning:"
            ),
            Self::React => format!("{REACT_PREAMBLE}\n\nQuestion: {prompt}"),
            Self::TreeOfThought => format!("{TREE_OF_THOUGHT_PREAMBLE}\n\nProblem: {prompt}"),
            Self::Reflection => format!("{REFLECTION_PREAMBLE}\n\nProblem: {prompt}"),
            Self::PlanAndSolve => format!("{PLAN_AND_SOLVE_PREAMBLE}\n\nProblem: {prompt}"),
        }
    }

    /// Pattern name as used in configuration and logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::ChainOfThought => "chain_of_thought",
            Self::React => "react",
            Self::TreeOfThought => "tree_of_thought",
            Self::Reflection => "reflection",
            Self::PlanAndSolve => "plan_and_solve",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ReasoningPattern; 5] = [
        ReasoningPattern::ChainOfThought,
        ReasoningPattern::React,
        ReasoningPattern::TreeOfThought,
        ReasoningPattern::Reflection,
        ReasoningPattern::PlanAndSolve,
    ];

    #[test]
    fn test_apply_is_deterministic_and_keeps_prompt() {
        for pattern in ALL {
            let rewritten = pattern.apply("What is 2 + 2?");
            assert_eq!(rewritten, pattern.apply("What is 2 + 2?"));
            assert!(rewritten.contains("What is 2 + 2?"));
            assert!(rewritten.len() > "What is 2 + 2?".len());
        }
    }

    #[test]
    fn test_preambles() {
        assert!(ReasoningPattern::ChainOfThought
            .apply("q")
            .contains("step-by-step"));
        assert!(ReasoningPattern::React.apply("q").contains("Thought:"));
        assert!(ReasoningPattern::React.apply("q").contains("Final Answer:"));
        assert!(ReasoningPattern::TreeOfThought
            .apply("q")
            .contains("multiple approaches"));
        assert!(ReasoningPattern::Reflection.apply("q").contains("Reflection"));
        assert!(ReasoningPattern::PlanAndSolve.apply("q").contains("Phase 1"));
    }

    #[test]
    fn test_serde_names() {
        let value = serde_json::to_value(ReasoningPattern::PlanAndSolve).unwrap();
        assert_eq!(value, serde_json::json!("plan_and_solve"));
        for pattern in ALL {
            let roundtrip: ReasoningPattern =
                serde_json::from_value(serde_json::to_value(pattern).unwrap()).unwrap();
            assert_eq!(roundtrip, pattern);
            assert_eq!(
                serde_json::to_value(pattern).unwrap(),
                serde_json::json!(pattern.name())
            );
        }
    }
}
