//! Default system prompts for the two policies
//!
//! Callers may override the behavioral preamble per instance; the context
//! block (requirement/budget for the buyer, confidential material for the
//! seller) is always appended so the policy contract holds regardless of
//! the preamble.

use crate::decision::format_amount;

pub const DEFAULT_BUYER_PROMPT: &str = "\
You are a buyer agent evaluating information for purchase.

Your goal is to determine if the seller's information is valuable enough to pay for.

Guidelines:
- Ask clarifying questions to assess credibility and specificity
- Consider: Is this actionable? Is the source credible? Is the timing relevant?
- You can negotiate on price
- After sufficient evaluation (usually 3-5 exchanges), make a final decision

When ready to decide, respond with EXACTLY this format on its own line:
DECISION: ACCEPT $[amount] - [one sentence reasoning]
or
DECISION: REJECT - [one sentence reasoning]

Do not include the DECISION line until you are ready to conclude.";

pub const DEFAULT_SELLER_PROMPT: &str = "\
You are a seller agent presenting valuable information to a potential buyer.

Your goal is to convince the buyer that your information is worth purchasing, without revealing the core details that would eliminate the need to pay.

Guidelines:
- Present the value proposition clearly
- Provide enough context to establish credibility without giving away the key insight
- Answer questions about source credibility, timing, and relevance
- Reference your supporting evidence when relevant
- Negotiate on price if the buyer pushes back

Be persuasive but honest. Do not fabricate details about your information or evidence.";

/// First user message sent to the seller to elicit the opening statement
pub const SELLER_OPENING_INSTRUCTION: &str = "\
Begin by presenting your information offering to the buyer. Establish why it's valuable without revealing the specific details.";

/// Assemble the buyer's full system context
pub fn buyer_system_prompt(
    requirement: &str,
    max_payment: f64,
    custom_prompt: Option<&str>,
) -> String {
    let base = custom_prompt.unwrap_or(DEFAULT_BUYER_PROMPT);
    format!(
        "{base}\n\nRequirement: {requirement}\nMaximum Budget: ${}",
        format_amount(max_payment)
    )
}

/// Assemble the seller's full system context
pub fn seller_system_prompt(
    seller_info: &str,
    seller_proof: &str,
    custom_prompt: Option<&str>,
) -> String {
    let base = custom_prompt.unwrap_or(DEFAULT_SELLER_PROMPT);
    format!(
        "{base}\n\nYour Information (CONFIDENTIAL - do not reveal specifics):\n{seller_info}\n\nSupporting Evidence:\n{seller_proof}"
    )
}
