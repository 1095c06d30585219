//! Local question bank and canned transition phrases

use crate::session::{Language, Question};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Smallest question list a session runs with
pub const MIN_QUESTIONS: usize = 3;

const BANK_EN: &[(&str, &str)] = &[
    ("Tell me about a challenge you faced at work and how you handled it.", "behavioral"),
    ("Describe a project you are proud of and your role in it.", "experience"),
    ("How do you prioritise when several deadlines compete for your time?", "organisation"),
    ("Tell me about a time you disagreed with a colleague. What happened?", "teamwork"),
    ("What is a skill you have improved recently, and how did you do it?", "growth"),
    ("How do you approach a problem you have never seen before?", "problem-solving"),
    ("Describe a mistake you made and what you learned from it.", "behavioral"),
    ("Where do you see yourself growing in the next few years?", "motivation"),
];

const BANK_AR: &[(&str, &str)] = &[
    ("حدثني عن تحد واجهته في العمل وكيف تعاملت معه.", "behavioral"),
    ("صف مشروعا تفخر به ودورك فيه.", "experience"),
    ("كيف ترتب أولوياتك عندما تتزاحم عدة مواعيد نهائية؟", "organisation"),
    ("حدثني عن موقف اختلفت فيه مع زميل. ماذا حدث؟", "teamwork"),
    ("ما المهارة التي طورتها مؤخرا، وكيف فعلت ذلك؟", "growth"),
    ("كيف تتعامل مع مشكلة لم تواجهها من قبل؟", "problem-solving"),
    ("صف خطأ ارتكبته وما الذي تعلمته منه.", "behavioral"),
    ("أين ترى نفسك تتطور خلال السنوات القليلة القادمة؟", "motivation"),
];

const TRANSITIONS_EN: &[&str] = &[
    "Thank you for that answer.",
    "Got it, thanks for explaining.",
    "That's helpful, let's move on.",
    "Interesting, thank you.",
    "Okay, noted.",
    "Thanks, that gives me a good picture.",
];

const TRANSITIONS_AR: &[&str] = &[
    "شكرا على هذه الإجابة.",
    "فهمت، شكرا على التوضيح.",
    "هذا مفيد، لننتقل إلى السؤال التالي.",
    "مثير للاهتمام، شكرا لك.",
    "حسنا، تم تسجيل ذلك.",
    "شكرا، هذا يعطيني صورة جيدة.",
];

/// Question bank for a language as `(question, category)` pairs
pub fn bank(language: Language) -> &'static [(&'static str, &'static str)] {
    match language {
        Language::English => BANK_EN,
        Language::Arabic => BANK_AR,
    }
}

/// `max(3, min(requested, bank_size))`
pub fn question_count(requested: usize, bank_size: usize) -> usize {
    requested.min(bank_size).max(MIN_QUESTIONS)
}

/// First `question_count(requested, ..)` questions from the bank
pub fn questions(language: Language, requested: usize) -> Vec<Question> {
    let bank = bank(language);
    bank.iter()
        .take(question_count(requested, bank.len()))
        .map(|(question, category)| Question::new(*question, *category))
        .collect()
}

/// Canned transition phrase, a pure function of its inputs
pub fn transition_phrase(language: Language, position: usize, seed: u64) -> &'static str {
    let phrases = match language {
        Language::English => TRANSITIONS_EN,
        Language::Arabic => TRANSITIONS_AR,
    };
    let mut rng = StdRng::seed_from_u64(seed ^ (position as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    phrases[rng.gen_range(0..phrases.len())]
}

/// Canned phrase followed by the next question
pub fn transition_line(language: Language, position: usize, seed: u64, next: &Question) -> String {
    format!("{} {}", transition_phrase(language, position, seed), next.question)
}
