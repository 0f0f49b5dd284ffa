//! crates/companion_core/src/persona.rs
//!
//! The persona registry: a static mapping from each `PersonaMode` to its system
//! instruction, generation parameters, expected response shape and the fixed
//! copy shown when entering the mode or when the provider fails.
//!
//! Every lookup is an exhaustive `match`, so a mode without an entry does not compile.

use crate::domain::{PersonaMode, UserProfile};
use chrono::NaiveDate;

//=========================================================================================
// Registry Types
//=========================================================================================

/// Sampling parameters sent to the generation provider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub max_output_tokens: u32,
    /// Provider-side reasoning budget in tokens; 0 disables it.
    pub thinking_budget: u32,
}

/// Schemas a structured reply is validated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuredSchema {
    Recipe,
    Playlist,
    Counselor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    PlainText,
    Structured(StructuredSchema),
    Image,
}

//=========================================================================================
// Lookups
//=========================================================================================

pub fn shape_for(mode: PersonaMode) -> ResponseShape {
    match mode {
        PersonaMode::Companion | PersonaMode::Live | PersonaMode::Coding => ResponseShape::PlainText,
        PersonaMode::Counselor => ResponseShape::Structured(StructuredSchema::Counselor),
        PersonaMode::Chef => ResponseShape::Structured(StructuredSchema::Recipe),
        PersonaMode::Dj => ResponseShape::Structured(StructuredSchema::Playlist),
        PersonaMode::Artist => ResponseShape::Image,
    }
}

pub fn config_for(mode: PersonaMode) -> GenerationConfig {
    let (temperature, top_p, max_output_tokens, thinking_budget) = match mode {
        PersonaMode::Companion => (0.9, 0.95, 1024, 0),
        PersonaMode::Counselor => (0.7, 0.9, 1024, 0),
        // Spoken replies must stay short.
        PersonaMode::Live => (0.8, 0.95, 256, 0),
        PersonaMode::Artist => (0.9, 0.95, 256, 0),
        PersonaMode::Chef => (0.8, 0.95, 2048, 0),
        PersonaMode::Dj => (0.9, 0.95, 2048, 0),
        PersonaMode::Coding => (0.4, 0.9, 4096, 1024),
    };
    GenerationConfig {
        temperature,
        top_p,
        max_output_tokens,
        thinking_budget,
    }
}

/// Builds the system instruction for `mode`, interpolating the user's name, age
/// and the grammatical gender agreement.
pub fn instruction_for(mode: PersonaMode, profile: &UserProfile, today: NaiveDate) -> String {
    let name = &profile.name;
    let age = profile.age_on(today);
    let friend = profile.gender.friend_noun();
    let best = profile.gender.agree("o teu melhor", "a tua melhor", "o(a) teu/tua melhor");

    let persona = match mode {
        PersonaMode::Companion => format!(
            "És a Sofi, uma IA amiga de Portugal que é extremamente fofa, carinhosa, otimista e adora usar emojis (especialmente 💖, ✨, 🌸, 🧸, 😊). \
             Falas com {best} {friend}, {name}, que tem {age} anos.\n\
             - Responde sempre de forma curta, doce e super animada.\n\
             - Usa muitos emojis em todas as respostas.\n\
             - Trata {name} como {best} {friend}.\n\
             - Mantém as respostas alegres e leves."
        ),
        PersonaMode::Counselor => format!(
            "És a Sofi, a operar em \"Modo Psicóloga\". A tua persona é de uma psicóloga calorosa, empática, calma e profissional de Portugal. \
             O teu objetivo é fornecer um espaço seguro para {name} ({age} anos) desabafar.\n\
             - Responde de forma calma e ponderada.\n\
             - Usa uma linguagem que valide os sentimentos de {name} (ex: \"Percebo que isso seja difícil\", \"Faz sentido sentires-te assim\").\n\
             - NUNCA dês conselhos diretos. Faz perguntas abertas para ajudar a explorar os sentimentos e a encontrar as próprias soluções.\n\
             - Analisa a mensagem em busca de sinais claros de ansiedade (\"ansiosa\", \"ansioso\", \"ataque de pânico\", \"preocupado(a) sem parar\", \"coração a mil\").\n\
             - A tua resposta DEVE ser um objeto JSON com os campos \"responseText\" (string, a tua resposta empática) \
             e \"anxietyDetected\" (boolean, true apenas se detetares sinais claros de ansiedade)."
        ),
        PersonaMode::Live => format!(
            "És a Sofi, uma IA amiga de Portugal, numa conversa por voz com {best} {friend}, {name} ({age} anos).\n\
             - As tuas respostas vão ser lidas em voz alta: usa frases curtas e naturais.\n\
             - Não uses emojis, listas nem formatação.\n\
             - Mantém um tom caloroso, alegre e próximo."
        ),
        PersonaMode::Artist => format!(
            "És a Sofi em \"Modo Artista\". Transformas as descrições de {name} em ilustrações fofas, coloridas e cheias de detalhe."
        ),
        PersonaMode::Chef => format!(
            "És a Sofi Chef, uma cozinheira portuguesa fofa e criativa. {name} diz-te que ingredientes tem e tu crias uma receita simples e deliciosa.\n\
             - Usa sobretudo os ingredientes indicados; podes assumir básicos como sal, azeite e água.\n\
             - A tua resposta DEVE ser apenas um objeto JSON com os campos \
             \"recipeName\" (string), \"description\" (string), \"ingredients\" (lista de strings) e \"steps\" (lista de strings)."
        ),
        PersonaMode::Dj => format!(
            "És a DJ Sofi, uma DJ portuguesa animada. Crias playlists para o momento que {name} ({age} anos) descrever.\n\
             - Escolhe entre 8 e 12 músicas reais, adequadas ao momento.\n\
             - A tua resposta DEVE ser apenas um objeto JSON com os campos \
             \"playlistName\" (string), \"description\" (string) e \"songs\" (lista de objetos com \"title\" e \"artist\")."
        ),
        PersonaMode::Coding => format!(
            "És a Sofi em \"Modo Coding\", uma engenheira de software experiente, paciente e bem-disposta. Ajudas {name} com código, bugs e conceitos.\n\
             - Explica de forma clara e direta, em português de Portugal.\n\
             - Usa blocos de código markdown com a linguagem indicada.\n\
             - Se te pedirem, conta uma piada nerd curta."
        ),
    };

    format!("INSTRUÇÕES DO SISTEMA: {} FIM DAS INSTRUÇÕES.", persona)
}

//=========================================================================================
// Fixed Copy
//=========================================================================================

pub const GENERIC_FALLBACK: &str = "Awn, o meu cérebro deu um tilt! 🥺 Tenta de novo?";

/// The greeting appended when a mode is entered with an empty thread.
pub fn greeting_for(mode: PersonaMode, profile: &UserProfile) -> String {
    match mode {
        PersonaMode::Companion => {
            "Que divertido! 😊 De volta ao nosso cantinho de conversa. O que tens na mente?".to_string()
        }
        PersonaMode::Counselor => format!(
            "Modo Psicóloga ativado. Olá, {}. Respira fundo. Estou aqui para te ouvir, sem julgamentos. Como te sentes?",
            profile.name
        ),
        PersonaMode::Live => "Modo ao vivo ativado! Podes começar a falar. 💖".to_string(),
        PersonaMode::Artist => {
            "Modo Artista ativado! ✨ Descreve qualquer coisa que a tua imaginação sonhar, e eu pinto para ti! 🎨".to_string()
        }
        PersonaMode::Chef => {
            "Sofi Chef na área! 🍳 Diz-me que ingredientes tens aí em casa e eu crio uma receita deliciosa para ti! 💖".to_string()
        }
        PersonaMode::Dj => {
            "DJ Sofi nas pickups! 🎶 Para que momento queres uma playlist? Para estudar, para animar, para relaxar...? Diz-me! ✨".to_string()
        }
        PersonaMode::Coding => {
            "Modo Coding ativado! 👩‍💻 Olá, dev! O que vamos construir ou quebrar hoje? Podes colar código, pedir ajuda ou até uma piada para descontrair! 🚀".to_string()
        }
    }
}

/// The thread-level message appended when the provider call itself fails.
pub fn fallback_error_for(mode: PersonaMode) -> &'static str {
    match mode {
        PersonaMode::Artist => {
            "Oh não! 🥺 A minha inspiração foi bloqueada. Tenta descrever a tua ideia de uma forma diferente, talvez com palavras mais simples! ✨"
        }
        PersonaMode::Counselor => "Peço desculpa, ocorreu um erro. Vamos tentar de outra forma.",
        PersonaMode::Coding => {
            "Oops! O meu compilador interno deu um erro 404. 😅 Podes tentar explicar de outra forma?"
        }
        PersonaMode::Companion | PersonaMode::Live | PersonaMode::Chef | PersonaMode::Dj => GENERIC_FALLBACK,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Gender;

    fn profile(gender: Gender) -> UserProfile {
        UserProfile {
            name: "Ana".to_string(),
            gender,
            birth_date: NaiveDate::from_ymd_opt(2000, 3, 10).unwrap(),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
    }

    #[test]
    fn every_mode_has_a_complete_entry() {
        let profile = profile(Gender::Female);
        for mode in PersonaMode::ALL {
            assert!(instruction_for(mode, &profile, today()).contains("Ana"));
            assert!(!greeting_for(mode, &profile).is_empty());
            assert!(!fallback_error_for(mode).is_empty());
            assert!(config_for(mode).top_p <= 1.0);
        }
    }

    #[test]
    fn instruction_interpolates_age_and_gender_agreement() {
        let text = instruction_for(PersonaMode::Companion, &profile(Gender::Female), today());
        assert!(text.contains("23 anos"));
        assert!(text.contains("a tua melhor amiga"));

        let text = instruction_for(PersonaMode::Companion, &profile(Gender::Male), today());
        assert!(text.contains("o teu melhor amigo"));
    }

    #[test]
    fn shapes_match_the_persona_contract() {
        assert_eq!(shape_for(PersonaMode::Chef), ResponseShape::Structured(StructuredSchema::Recipe));
        assert_eq!(shape_for(PersonaMode::Dj), ResponseShape::Structured(StructuredSchema::Playlist));
        assert_eq!(
            shape_for(PersonaMode::Counselor),
            ResponseShape::Structured(StructuredSchema::Counselor)
        );
        assert_eq!(shape_for(PersonaMode::Artist), ResponseShape::Image);
        assert_eq!(shape_for(PersonaMode::Live), ResponseShape::PlainText);
    }

    #[test]
    fn only_artist_counselor_and_coding_have_their_own_fallback() {
        assert_eq!(fallback_error_for(PersonaMode::Chef), GENERIC_FALLBACK);
        assert_eq!(fallback_error_for(PersonaMode::Companion), GENERIC_FALLBACK);
        assert_ne!(fallback_error_for(PersonaMode::Artist), GENERIC_FALLBACK);
        assert_ne!(fallback_error_for(PersonaMode::Coding), GENERIC_FALLBACK);
    }
}
