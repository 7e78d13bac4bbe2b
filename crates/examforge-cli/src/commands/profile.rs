//! The `examforge profile` command.

use anyhow::Result;
use comfy_table::{Cell, Table};

use crate::state::CliContext;

pub async fn execute(ctx: &CliContext, user: String, subject: Option<String>) -> Result<()> {
    let store = ctx.load_store()?;
    let profile = store.profile(&user).await;
    let profile = profile.lock().await;

    println!(
        "Profile for {user}: {} test(s), average {:.1}%, {} question(s) seen, personalization {:?}",
        profile.total_tests,
        profile.average_score(),
        profile.seen_question_ids.len(),
        profile.personalization_level()
    );

    if let Some(velocity) = &profile.velocity {
        println!(
            "Velocity: {:?} ({:+.1}), consistency {:?}",
            velocity.trend, velocity.improvement_rate, velocity.consistency
        );
    }

    let subjects: Vec<String> = match subject {
        Some(s) => vec![s],
        None => {
            let mut all: Vec<String> =
                profile.topics.values().map(|t| t.subject.clone()).collect();
            all.sort();
            all.dedup();
            all
        }
    };

    for subject in &subjects {
        let weak = profile.weak_topics(subject);
        if !weak.is_empty() {
            println!("\nWeak topics — {subject}:");
            let mut table = Table::new();
            table.set_header(vec!["Topic", "Accuracy", "Attempts", "Priority"]);
            for topic in &weak {
                table.add_row(vec![
                    Cell::new(&topic.topic),
                    Cell::new(format!("{:.1}%", topic.accuracy)),
                    Cell::new(topic.attempts),
                    Cell::new(format!("{:.2}", topic.priority)),
                ]);
            }
            println!("{table}");
        }

        let patterns = profile.mistake_patterns(subject);
        if !patterns.is_empty() {
            println!("Mistake patterns — {subject}:");
            for pattern in &patterns {
                println!(
                    "  {} (error rate {:.1}% over {} attempts)",
                    pattern.topic, pattern.error_rate, pattern.attempts
                );
            }
        }
    }

    if profile.topics.is_empty() {
        println!("No topic history yet — generate and evaluate a test first.");
    }

    Ok(())
}
