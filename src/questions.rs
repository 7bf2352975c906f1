//! Built-in "who is most likely to..." prompts

use rand::seq::IndexedRandom;

use crate::types::Question;

const BANK: &[&str] = &[
    "Who is most likely to become famous?",
    "Who is most likely to forget their own birthday?",
    "Who is most likely to survive a zombie apocalypse?",
    "Who is most likely to cry during a movie?",
    "Who is most likely to get lost in their own city?",
    "Who is most likely to start a business?",
    "Who is most likely to eat something off the floor?",
    "Who is most likely to adopt ten cats?",
    "Who is most likely to win a reality show?",
    "Who is most likely to laugh at the wrong moment?",
    "Who is most likely to move to another country on a whim?",
    "Who is most likely to text their ex?",
    "Who is most likely to be late to their own wedding?",
    "Who is most likely to binge a whole series in one night?",
    "Who is most likely to talk their way out of a parking ticket?",
    "Who is most likely to become a millionaire?",
    "Who is most likely to fall asleep at a party?",
    "Who is most likely to go viral online?",
    "Who is most likely to run a marathon without training?",
    "Who is most likely to sing karaoke first?",
    "Who is most likely to lose their phone tonight?",
    "Who is most likely to befriend a stranger on the bus?",
    "Who is most likely to burn water while cooking?",
    "Who is most likely to plan the next trip?",
];

/// Turn free-form prompts into indexed questions, dropping blank lines
pub fn from_texts<I, S>(texts: I) -> Vec<Question>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    texts
        .into_iter()
        .map(|t| t.as_ref().trim().to_string())
        .filter(|t| !t.is_empty())
        .enumerate()
        .map(|(index, text)| Question { index, text })
        .collect()
}

/// Draw `count` distinct prompts from the bank in random order
pub fn draw(count: usize) -> Vec<Question> {
    let mut rng = rand::rng();
    from_texts(BANK.choose_multiple(&mut rng, count.min(BANK.len())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_draw_is_distinct_and_indexed() {
        let questions = draw(5);
        assert_eq!(questions.len(), 5);
        let texts: HashSet<_> = questions.iter().map(|q| q.text.as_str()).collect();
        assert_eq!(texts.len(), 5);
        for (i, q) in questions.iter().enumerate() {
            assert_eq!(q.index, i);
        }
    }

    #[test]
    fn test_draw_caps_at_bank_size() {
        assert_eq!(draw(1000).len(), BANK.len());
    }

    #[test]
    fn test_from_texts_skips_blank_entries() {
        let questions = from_texts(["  Who is most likely to nap? ", "", "   ", "Who wins?"]);
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].text, "Who is most likely to nap?");
        assert_eq!(questions[1].index, 1);
    }
}
