//! Prompt builder for batch items
//!
//! Each post prompt carries:
//! - The brief and the platform's format guidance
//! - Learnings from the posts already finished in this batch
//! - The adaptive target score
//! - Self-grading instructions so the score can be parsed back out

use scribe_core::Platform;

use crate::batch::BatchPlan;

/// System prompt shared by every content request
pub const SYSTEM_PROMPT: &str = "You are Scribe, a content strategist who writes platform-native \
posts for a founder's personal brand. Write in a direct, concrete voice. Never invent statistics \
or quotes.";

/// Short format guidance for a platform
pub fn platform_guidance(platform: Platform) -> &'static str {
    match platform {
        Platform::Linkedin => {
            "LinkedIn post, 150-300 words. Open with a one-line hook, use short paragraphs, \
             end with a question that invites comments. At most three hashtags."
        }
        Platform::Instagram => {
            "Instagram caption, under 150 words. Lead with the payoff, keep lines short, \
             finish with a call to save or share and five to eight hashtags."
        }
        Platform::Youtube => {
            "YouTube video script, 60-90 seconds spoken. Hook in the first five seconds, \
             mark [B-ROLL] cues, close with a subscribe prompt tied to the topic."
        }
        Platform::Twitter => {
            "X/Twitter thread of 4-7 tweets, each under 280 characters. The first tweet \
             must stand alone. No hashtags in the body."
        }
        Platform::Email => {
            "Newsletter email with a subject line under 50 characters, a personal opening, \
             one idea developed fully and a single call to action."
        }
        Platform::Unknown => "Short-form post. Lead with a hook and keep it skimmable.",
    }
}

/// Build the prompt for item `index` (1-based) of a batch
pub fn build_post_prompt(
    plan: &BatchPlan,
    index: usize,
    learnings: &str,
    target_score: u32,
) -> String {
    let mut prompt = String::new();

    prompt.push_str(&format!(
        "# POST {} of {} ({})\n\n",
        index, plan.count, plan.platform
    ));

    prompt.push_str("## BRIEF\n\n");
    prompt.push_str(plan.brief.trim());
    prompt.push_str("\n\n");

    prompt.push_str("## FORMAT\n\n");
    prompt.push_str(platform_guidance(plan.platform));
    prompt.push_str("\n\n");

    prompt.push_str("## WHAT HAS WORKED SO FAR\n\n");
    prompt.push_str(learnings.trim_end());
    prompt.push_str("\n\n");
    if index > 1 {
        prompt.push_str(
            "Do not repeat an angle or hook already used above. Build on what scored best.\n\n",
        );
    }

    prompt.push_str("## QUALITY BAR\n\n");
    prompt.push_str(&format!(
        "Grade your draft against the 25-point rubric (hook 5, clarity 5, specificity 5, \
         platform fit 5, call to action 5). Revise until it reaches at least {}/25.\n\n",
        target_score
    ));

    prompt.push_str("## OUTPUT\n\n");
    prompt.push_str(
        "Return only the final post, then a last line in the form `Score: N/25` with your grade.\n",
    );

    prompt
}
