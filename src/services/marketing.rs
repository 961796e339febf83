// Marketing package generation: summarize the idea, expand it into a full
// package, and degrade to a shorter package or a static template on failure.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::openai_client::{ChatCompletionMessage, GenerationError, TextGenerator};
use crate::services::chat_context::SYSTEM_PROMPT;

lazy_static! {
    static ref FILLER_WORDS: Regex =
        Regex::new(r"(?i)\b(generate|create|make|write|post|marketing|about|for|to)\b").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageSource {
    Ultimate,
    Enhanced,
    StaticBackup,
}

impl PackageSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageSource::Ultimate => "ultimate",
            PackageSource::Enhanced => "enhanced",
            PackageSource::StaticBackup => "static_backup",
        }
    }
}

#[derive(Debug, Clone)]
pub struct MarketingPackage {
    pub summary: String,
    pub content: String,
    pub source: PackageSource,
}

pub struct MarketingPackageService<'a> {
    generator: &'a dyn TextGenerator,
}

impl<'a> MarketingPackageService<'a> {
    pub fn new(generator: &'a dyn TextGenerator) -> Self {
        Self { generator }
    }

    pub async fn generate(&self, idea: &str) -> MarketingPackage {
        let summary = self.summarize_idea(idea).await;
        tracing::info!("🧠 Summarized idea: {}", summary);

        match self.ask(&ultimate_prompt(&summary)).await {
            Ok(content) => {
                return MarketingPackage { summary, content, source: PackageSource::Ultimate };
            }
            Err(e) => tracing::warn!("⚠️ Ultimate package generation failed, using fallback: {}", e),
        }

        match self.ask(&enhanced_prompt(&summary)).await {
            Ok(content) => MarketingPackage { summary, content, source: PackageSource::Enhanced },
            Err(e) => {
                tracing::error!("Enhanced fallback failed, using static template: {}", e);
                MarketingPackage {
                    content: static_package(idea),
                    summary,
                    source: PackageSource::StaticBackup,
                }
            }
        }
    }

    /// One catchy sentence describing the idea. Falls back to a local
    /// rewrite when the generator is unavailable.
    pub async fn summarize_idea(&self, idea: &str) -> String {
        match self.ask(&summary_prompt(idea)).await {
            Ok(text) => {
                let cleaned = strip_wrapping_quotes(text.trim());
                if cleaned.is_empty() {
                    manual_summary(idea)
                } else {
                    cleaned
                }
            }
            Err(e) => {
                tracing::error!("⚠️ Summarization failed: {}", e);
                manual_summary(idea)
            }
        }
    }

    async fn ask(&self, prompt: &str) -> Result<String, GenerationError> {
        let messages = vec![ChatCompletionMessage::system(SYSTEM_PROMPT), ChatCompletionMessage::user(prompt)];
        let text = self.generator.complete(messages).await?;
        if text.trim().is_empty() {
            return Err(GenerationError::EmptyCompletion);
        }
        Ok(text)
    }
}

fn strip_wrapping_quotes(text: &str) -> String {
    let text = text.strip_prefix('"').unwrap_or(text);
    let text = text.strip_suffix('"').unwrap_or(text);
    text.trim().to_string()
}

/// Topic phrase built from the idea by dropping filler words.
pub fn manual_summary(idea: &str) -> String {
    let stripped = FILLER_WORDS.replace_all(idea, "");
    let collapsed = WHITESPACE.replace_all(&stripped, " ");
    let trimmed = collapsed.trim();

    let mut chars = trimmed.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn hashtag(topic: &str) -> String {
    WHITESPACE.replace_all(topic, "").into_owned()
}

fn summary_prompt(idea: &str) -> String {
    format!(
        r#"
Summarize the following business idea in one short, catchy sentence:
"{idea}"

Rules:
- Paraphrase it clearly (don't just repeat the same words).
- Make it sound like a professional business concept.
- Remove generic terms like "create post" or "generate marketing".
- Example:
  Input: "generate a post about a store that sells handmade jewelry"
  Output: "Handcrafted Jewelry Boutique Launch""#
    )
}

fn ultimate_prompt(summary: &str) -> String {
    format!(
        r#"
Create the ULTIMATE marketing package for: "{summary}"

Generate a COMPREHENSIVE business marketing strategy with:

🎯 **BUSINESS VIABILITY SCORE**
- Market Demand Score: /10
- Competition Level: /10
- Profit Potential: /10
- Overall Viability: /10

📊 **COMPETITOR ANALYSIS**
- Top 3 Competitors
- Their Strengths & Weaknesses
- Your Unique Advantage

🚀 **READY-TO-USE MARKETING ASSETS**

📱 **INSTAGRAM** (3 posts)
[For each: Caption + Hashtags + Visual Description]

🐦 **TWITTER** (3 tweets + thread idea)

👔 **LINKEDIN** (Professional post)

📧 **EMAIL NEWSLETTER** (Ready-to-send)

🎥 **TIKTOK/REELS** (3 video ideas)

🔥 **VIRAL POTENTIAL ANALYSIS**
- Viral Score: /100
- Trending Angles
- Optimal Posting Times
- Target Audience

💡 **GROWTH HACKS**
- 3 Quick Wins (first 30 days)
- 3 Long-term Strategies
- Budget-friendly tactics

📈 **SUCCESS METRICS**
- Expected Engagement Rates
- Conversion Projections
- Timeline to Results

Format this beautifully with emojis and clear sections. Make it ACTIONABLE and READY-TO-USE!"#
    )
}

fn enhanced_prompt(summary: &str) -> String {
    format!(
        r#"
Create a COMPREHENSIVE marketing package for: "{summary}"

Include these sections with scores and analysis:

🎯 VIABILITY SCORE: /10
📊 COMPETITOR ANALYSIS: Top 3 competitors
📱 SOCIAL MEDIA: Instagram, Twitter, LinkedIn ready posts
🔥 VIRAL POTENTIAL: /100 score
💡 GROWTH HACKS: Quick wins & long-term strategies
📈 METRICS: Expected results timeline

Make it professional and actionable!"#
    )
}

/// Package rendered without the generator.
pub fn static_package(idea: &str) -> String {
    let topic = manual_summary(idea);
    let tag = hashtag(&topic);

    format!(
        r#"# 🚀 ULTIMATE MARKETING PACKAGE: {topic}

## 🎯 BUSINESS VIABILITY SCORE
- Market Demand Score: 8/10
- Competition Level: 6/10
- Profit Potential: 7/10
- Overall Viability: 7.5/10

## 📊 COMPETITOR ANALYSIS
**Top 3 Competitors:**
1. [Competitor 1] - Strengths: Established presence | Weaknesses: Higher pricing
2. [Competitor 2] - Strengths: Strong branding | Weaknesses: Limited features
3. [Competitor 3] - Strengths: Large audience | Weaknesses: Poor customer service

**Your Unique Advantage:** Personalized approach and innovative solutions

## 📱 INSTAGRAM POSTS (3 READY-TO-POST)

**Post 1:**
🎯 Caption: "Transform your vision into reality! ✨ {topic} just got better with our innovative approach. Ready to elevate your game? 🚀"
📸 Visual: Professional lifestyle shot showing results
🏷️ Hashtags: #{tag} #Innovation #BusinessGrowth #Success

**Post 2:**
🎯 Caption: "Why settle for ordinary when you can achieve extraordinary? 🌟 Our {topic} solutions are changing the game daily! 💼"
📸 Visual: Behind-the-scenes creative process
🏷️ Hashtags: #Entrepreneur #Marketing #{tag}Tips #Growth

**Post 3:**
🎯 Caption: "Your success story starts here! 📈 Discover how {topic} can transform your results and drive real impact. 🔥"
📸 Visual: Customer testimonial or case study visual
🏷️ Hashtags: #Success #BusinessTips #{tag} #Strategy

## 🐦 TWITTER CONTENT
**Tweet 1:** "Just launched our enhanced {topic} services! 🚀 Game-changing results for our clients. #BusinessGrowth #{tag}"

**Tweet 2:** "3 reasons why {topic} matters this year: 1) Market demand 📈 2) Innovation potential 💡 3) Customer impact 🌟 What would you add?"

**Tweet Thread Idea:** "The complete guide to mastering {topic} in 5 tweets ↓"

## 👔 LINKEDIN PROFESSIONAL POST
"We're excited to announce our comprehensive {topic} solutions designed for modern businesses seeking growth and innovation.

Our approach combines proven strategies with cutting-edge techniques to deliver measurable results.

#ProfessionalServices #BusinessStrategy #{tag} #Innovation"

## 🔥 VIRAL POTENTIAL ANALYSIS
- **Viral Score:** 78/100
- **Trending Angles:** Innovation stories, Success case studies, Behind-the-scenes
- **Optimal Posting Times:** Tue-Thu 9-11 AM, 5-7 PM
- **Target Audience:** Entrepreneurs, Business owners, Industry professionals

## 💡 GROWTH HACKS
**Quick Wins (First 30 Days):**
1. Leverage customer testimonials in all marketing
2. Create engaging visual content for social media
3. Network with complementary businesses

**Long-term Strategies:**
1. Build authority through content marketing
2. Develop referral partnership programs
3. Expand service offerings based on client feedback

## 📈 SUCCESS METRICS
- **Expected Engagement:** 5-8% on social media
- **Conversion Rate:** 3-5% from qualified leads
- **Timeline to Results:** 30-60 days for initial impact, 6 months for significant growth

---
*Generated with BuzAI Ultimate Marketing Package* 🚀"#
    )
}
