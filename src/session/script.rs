//! Canned agent lines for the fixed parts of an interview

use super::{CandidateProfile, Language};

pub fn greeting(profile: &CandidateProfile) -> String {
    match profile.language {
        Language::English => format!(
            "Hi {}, welcome to your mock interview for the {} role. I'm your interviewer today. Can you hear me clearly?",
            profile.candidate_name, profile.target_role
        ),
        Language::Arabic => format!(
            "مرحبا {}، أهلا بك في المقابلة التجريبية لوظيفة {}. أنا من سيجري معك المقابلة اليوم. هل تسمعني بوضوح؟",
            profile.candidate_name, profile.target_role
        ),
    }
}

pub fn warmup(profile: &CandidateProfile) -> String {
    match profile.language {
        Language::English => {
            "Great. Before we start, tell me a little about yourself and what draws you to this role.".to_string()
        }
        Language::Arabic => {
            "ممتاز. قبل أن نبدأ، حدثني قليلا عن نفسك وما الذي يجذبك إلى هذه الوظيفة.".to_string()
        }
    }
}

/// Lead-in spoken before the first question
pub fn first_question(language: Language, question: &str) -> String {
    match language {
        Language::English => format!("Thanks for sharing. Let's begin. {}", question),
        Language::Arabic => format!("شكرا لك. لنبدأ. {}", question),
    }
}

pub fn closing(language: Language) -> String {
    match language {
        Language::English => {
            "That was my last question. Is there anything you would like to add before we wrap up?".to_string()
        }
        Language::Arabic => "كان هذا سؤالي الأخير. هل تود إضافة أي شيء قبل أن نختم؟".to_string(),
    }
}

pub fn farewell(profile: &CandidateProfile) -> String {
    match profile.language {
        Language::English => format!(
            "Thank you, {}. This concludes the interview. Your feedback summary will be ready in a moment.",
            profile.candidate_name
        ),
        Language::Arabic => format!(
            "شكرا لك يا {}. انتهت المقابلة. سيكون ملخص التقييم جاهزا خلال لحظات.",
            profile.candidate_name
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greeting_is_personalised() {
        let profile = CandidateProfile::new("Layla", "Data Analyst");
        let line = greeting(&profile);
        assert!(line.contains("Layla"));
        assert!(line.contains("Data Analyst"));
    }

    #[test]
    fn test_arabic_lines() {
        let profile = CandidateProfile::new("ليلى", "محللة بيانات").with_language(Language::Arabic);
        assert!(greeting(&profile).contains("ليلى"));
        assert!(farewell(&profile).contains("ليلى"));
        assert!(first_question(Language::Arabic, "سؤال").ends_with("سؤال"));
    }
}
