//! Built-in catalog of selectable interest topics.

pub const TOPICS: &[&str] = &[
    "Programming",
    "Data Science",
    "Technology",
    "Self Improvement",
    "Writing",
    "Relationships",
    "Machine Learning",
    "Productivity",
    "Politics",
    "Cryptocurrency",
    "Psychology",
    "Money",
    "Business",
    "Python",
    "Health",
    "Science",
    "Mental Health",
    "Life",
    "Software Development",
    "Startup",
    "Design",
    "JavaScript",
    "Artificial Intelligence",
    "Culture",
    "Software Engineering",
    "Blockchain",
    "Coding",
    "Entrepreneurship",
    "React",
    "UX",
    "Education",
    "History",
    "Humor",
    "Web Development",
    "Work",
    "Lifestyle",
    "Society",
    "Deep Learning",
    "Marketing",
    "Books",
    "NFT",
    "Social Media",
    "Leadership",
    "Android",
    "Apple",
    "Women",
    "Mindfulness",
    "Sexuality",
];

/// Catalog spelling of `topic`, matched case-insensitively after trimming.
pub fn canonical_topic(topic: &str) -> Option<&'static str> {
    let topic = topic.trim();
    TOPICS.iter().copied().find(|t| t.eq_ignore_ascii_case(topic))
}

pub fn is_known_topic(topic: &str) -> bool {
    canonical_topic(topic).is_some()
}
