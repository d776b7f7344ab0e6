//! Recommendation command handlers.

use crate::advice::Cycle;
use crate::app::App;
use crate::args::{DismissArgs, FeedbackArgs, RecommendationsArgs};
use crate::commands::{plural, Out};
use crate::error::{typed_error, ErrorType};
use crate::model::Recommendation;
use crate::{Config, Result};
use anyhow::Context;

/// Generates new personalized recommendations, replacing the ones that were not dismissed.
pub async fn advise(config: Config) -> Result<Out<Vec<Recommendation>>> {
    let app = App::open(config)?;
    let cycle = app
        .engine()
        .spawn_generate()
        .await
        .context("The recommendation task did not finish")?;
    completed(cycle, "recommendation")
}

/// Replaces the holiday recommendations with advice for the nearest upcoming holiday.
pub async fn holidays(config: Config) -> Result<Out<Vec<Recommendation>>> {
    let app = App::open(config)?;
    let cycle = app.engine().update_holiday_recommendations().await;
    completed(cycle, "holiday recommendation")
}

/// Shows the active recommendations, or all of them with `--all`.
pub async fn recommendations(
    config: Config,
    args: RecommendationsArgs,
) -> Result<Out<Vec<Recommendation>>> {
    let app = App::open(config)?;
    let recommendations = if args.all() {
        app.engine().all()
    } else {
        app.engine().active()
    };
    Ok(Out::new(
        render(&recommendations, "recommendation"),
        recommendations,
    ))
}

/// Dismisses a recommendation. Dismissing it again changes nothing.
pub async fn dismiss(config: Config, args: DismissArgs) -> Result<Out<bool>> {
    let app = App::open(config)?;
    let changed = app.engine().dismiss(args.id())?;
    let message = if changed {
        format!("Dismissed recommendation {}", args.id())
    } else {
        format!("Recommendation {} was already dismissed", args.id())
    };
    Ok(Out::new(message, changed))
}

/// Records whether a recommendation was helpful.
pub async fn feedback(config: Config, args: FeedbackArgs) -> Result<Out<String>> {
    let app = App::open(config)?;
    let key = app.engine().feedback(
        args.id(),
        args.helpful(),
        args.comment().map(str::to_string),
    )?;
    Ok(Out::new(
        format!("Recorded feedback on recommendation {}", args.id()),
        key,
    ))
}

fn completed(cycle: Cycle, noun: &str) -> Result<Out<Vec<Recommendation>>> {
    match cycle {
        Cycle::Completed {
            source,
            recommendations,
        } => {
            let mut message = render(&recommendations, noun);
            message.push_str(&format!("\n(source: {source})"));
            Ok(Out::new(message, recommendations))
        }
        Cycle::AlreadyRunning => Err(typed_error(
            ErrorType::Busy,
            "Recommendations are already being generated",
        )),
    }
}

fn render(recommendations: &[Recommendation], noun: &str) -> String {
    let mut message = plural(recommendations.len(), noun);
    for r in recommendations {
        let dismissed = if r.is_dismissed() { " (dismissed)" } else { "" };
        message.push_str(&format!("\n{}  {}{dismissed}", r.id(), r.message()));
    }
    message
}
