//! The `quizscore init` command.

use std::path::Path;

use anyhow::Result;

pub fn execute() -> Result<()> {
    if Path::new("quizscore.toml").exists() {
        println!("quizscore.toml already exists, skipping.");
    } else {
        std::fs::write("quizscore.toml", SAMPLE_CONFIG)?;
        println!("Created quizscore.toml");
    }

    std::fs::create_dir_all("quizzes/answers")?;
    for (path, content) in [
        ("quizzes/example.toml", EXAMPLE_QUIZ),
        ("quizzes/answers/example.json", EXAMPLE_ANSWERS),
    ] {
        if Path::new(path).exists() {
            println!("{path} already exists, skipping.");
        } else {
            std::fs::write(path, content)?;
            println!("Created {path}");
        }
    }

    println!("\nNext steps:");
    println!("  1. Run: quizscore validate --test quizzes/example.toml");
    println!("  2. Run: quizscore score --test quizzes/example.toml --answers quizzes/answers/example.json");
    println!("  3. Run: quizscore batch --test quizzes/example.toml --answers-dir quizzes/answers");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# quizscore configuration

parallelism = 4
output_dir = "./quizscore-results"
# store_dir = "${HOME}/.local/share/quizscore/records"

[limits]
max_formula_len = 1024
max_formula_depth = 64
max_combo_depth = 32

[scoring]
require_complete = false
"#;

const EXAMPLE_QUIZ: &str = r#"id = "example"
version = 1
name = "Example Quiz"
description = "A two-question quiz to get started"

[[questions]]
id = "weekend"
text = "How do you like to spend a free weekend?"
answerType = "single"

[[questions.options]]
id = "party"
text = "At a big party"
weights = { social = 3 }

[[questions.options]]
id = "book"
text = "With a good book"
weights = { social = -1, reflective = 2 }

[[questions]]
id = "traits"
text = "Which describe you?"
answerType = "multi"

[[questions.options]]
id = "talkative"
text = "Talkative"
weights = { social = 2 }

[[questions.options]]
id = "thoughtful"
text = "Thoughtful"
weights = { reflective = 2 }

[[scales]]
key = "social"
name = "Sociability"
min = 0
max = 5
bands = [
    { to = 2, label = "low" },
    { to = 5, label = "high", interpretation = "You recharge around people." },
]

[[scales]]
key = "reflective"
name = "Reflection"
min = 0
max = 4
bands = [
    { to = 1, label = "low" },
    { to = 4, label = "high", interpretation = "You think things through." },
]

[[rules]]
id = "extrovert"
kind = "threshold"
priority = 10

[rules.payload]
scale = "social"
op = ">="
value = 4
summaryType = "extrovert"
summary = "You draw energy from other people."

[[rules]]
id = "introvert"
kind = "formula"
priority = 20

[rules.payload]
expression = "reflective > social"
summaryType = "introvert"
summary = "You draw energy from time alone."

[defaultResult]
summaryType = "ambivert"
summary = "You balance social time and time alone."
"#;

const EXAMPLE_ANSWERS: &str = r#"{
  "weekend": "party",
  "traits": ["talkative", "thoughtful"]
}
"#;
