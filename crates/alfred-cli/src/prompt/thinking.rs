use rand::seq::SliceRandom;

const THINKING_MESSAGES: &[&str] = &[
    "Consulting the guest list",
    "Polishing the silverware",
    "Checking the seating chart",
    "Straightening the tablecloths",
    "Reviewing the invitations",
    "Decanting the wine",
    "Briefing the footmen",
    "Adjusting the candelabras",
    "Inspecting the canapés",
    "Tuning the string quartet",
    "Folding the napkins into swans",
    "Recalling who is not speaking to whom",
    "Warming the ballroom",
    "Straightening a portrait",
    "Counting the champagne flutes",
];

pub fn get_random_thinking_message() -> &'static str {
    THINKING_MESSAGES
        .choose(&mut rand::thread_rng())
        .unwrap_or(&THINKING_MESSAGES[0])
}
