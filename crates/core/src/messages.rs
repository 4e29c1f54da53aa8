//! User-facing message and status text.
//!
//! The bot talks to a Russian-speaking VK audience; the wording is part of
//! the product surface and is kept verbatim across modes.

use crate::domain::Track;

/// Static promotional suffix appended to every published status.
pub const STATUS_SUFFIX: &str = "vk.me/advancedstatus";

/// Literal OAuth page the user must visit; the token comes back on the
/// blank.html redirect.
pub const AUTHORIZE_URL: &str = "https://oauth.vk.com/authorize?client_id=6386667&\
                                 redirect_uri=https://oauth.vk.com/blank.html&\
                                 scope=offline,status&response_type=token&v=5.74";

pub fn authorize_prompt() -> String {
    format!(
        "Для начала тебя нужно авторизовать. \
         Перейди по ссылке и пришли мне ссылку из адресной строки: \n{AUTHORIZE_URL}"
    )
}

/// Shown after a successful token link in scrobble mode.
pub fn linked_scrobble_instructions() -> String {
    "Отлично, теперь ты можешь подключить аккаунт Last.Fm командой:\nsetlastfm твой_ник".to_owned()
}

/// Shown after a successful token link in status and intent modes.
pub fn linked_status_instructions() -> String {
    "Отлично, теперь просто пришли мне текст, и я поставлю его тебе в статус.".to_owned()
}

pub fn scrobble_set(scrobble_id: &str, user_id: &str) -> String {
    format!("Добавил {scrobble_id} для пользователя {user_id}")
}

pub fn scrobble_unset(scrobble_id: &str) -> String {
    format!("Отвязал профиль last.fm {scrobble_id}.")
}

pub fn nothing_to_unset() -> String {
    "У тебя нет привязанного профиля last.fm, так что мне нечего отвязывать.".to_owned()
}

pub fn help() -> String {
    "Я тебя не понимаю.\nДоступные команды:\nsetlastfm имя_аккаунта_last_fm\nunsetlastfm".to_owned()
}

/// Status text for a now-playing change. A cleared track falls back to the
/// bare promotional suffix.
pub fn status_text(track: Option<&Track>) -> String {
    match track {
        Some(track) => format!("Слушает {} - {}, {STATUS_SUFFIX}", track.artist, track.name),
        None => STATUS_SUFFIX.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::{status_text, STATUS_SUFFIX};
    use crate::domain::Track;

    #[test]
    fn status_text_embeds_artist_and_title() {
        let track = Track { artist: "Boards of Canada".to_owned(), name: "Roygbiv".to_owned() };
        assert_eq!(
            status_text(Some(&track)),
            "Слушает Boards of Canada - Roygbiv, vk.me/advancedstatus"
        );
    }

    #[test]
    fn cleared_track_falls_back_to_suffix() {
        assert_eq!(status_text(None), STATUS_SUFFIX);
    }

    #[test]
    fn authorize_prompt_carries_the_literal_oauth_url() {
        let prompt = super::authorize_prompt();
        assert!(prompt.contains("client_id=6386667"));
        assert!(prompt.contains("redirect_uri=https://oauth.vk.com/blank.html"));
        assert!(prompt.contains("scope=offline,status"));
        assert!(prompt.contains("response_type=token"));
        assert!(prompt.contains("v=5.74"));
    }
}
