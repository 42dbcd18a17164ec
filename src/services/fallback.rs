//! Locally synthesized replies for when the inference server is down.
//!
//! The reply is selected by simple keyword matching against the user's
//! message and then streamed word by word with an artificial delay, so the
//! client sees the same event protocol as a real upstream stream.

use crate::types::events::StreamEvent;
use futures::Stream;
use std::time::Duration;

const FEVER_REPLY: &str = "A fever is often a sign that your body is fighting an infection. \
    Rest, stay hydrated, and consider an over-the-counter fever reducer if you are \
    uncomfortable. If your temperature stays above 39°C, lasts more than three days, or is \
    accompanied by severe symptoms, please contact a healthcare professional promptly.";

const HEADACHE_REPLY: &str = "Headaches have many causes, from dehydration and eye strain to \
    stress and lack of sleep. Drink water, rest in a quiet dark room, and consider a mild pain \
    reliever. If the headache is sudden and severe, or comes with vision changes or numbness, \
    seek medical care right away.";

const COUGH_REPLY: &str = "For a cough or cold, rest and fluids are the foundation. Warm \
    drinks with honey can soothe your throat, and a humidifier may ease congestion. See a \
    doctor if symptoms last beyond ten days, you have difficulty breathing, or a high fever \
    develops.";

const PAIN_REPLY: &str = "I'm sorry you're in pain. For minor aches, rest the affected area \
    and consider an over-the-counter pain reliever. Persistent, severe, or worsening pain \
    should always be evaluated by a healthcare professional.";

const GENERIC_REPLY: &str = "I'm currently unable to reach the AI model, but I'm still here \
    to help with general guidance. For any specific or serious health concern, please consult \
    a qualified healthcare professional. You can also try sending your message again in a \
    moment.";

/// Pick a templated reply by keyword, most specific match first.
pub fn pick_reply(message: &str) -> &'static str {
    let lower = message.to_lowercase();
    if lower.contains("fever") || lower.contains("temperature") {
        FEVER_REPLY
    } else if lower.contains("headache") || lower.contains("migraine") {
        HEADACHE_REPLY
    } else if lower.contains("cough") || lower.contains("cold") || lower.contains("flu") {
        COUGH_REPLY
    } else if lower.contains("pain") || lower.contains("hurt") || lower.contains("ache") {
        PAIN_REPLY
    } else {
        GENERIC_REPLY
    }
}

/// Emit `reply` as one `ContentDelta` per whitespace-delimited word with a
/// fixed delay between words, then `Done`. Concatenating the deltas
/// reproduces the reply exactly.
pub fn fallback_stream(reply: String, word_delay: Duration) -> impl Stream<Item = StreamEvent> {
    async_stream::stream! {
        for (i, word) in reply.split_whitespace().enumerate() {
            if i > 0 {
                tokio::time::sleep(word_delay).await;
                yield StreamEvent::delta(format!(" {word}"));
            } else {
                yield StreamEvent::delta(word);
            }
        }
        yield StreamEvent::Done;
    }
}
