//! User-facing reply texts.

pub const HELP: &str = "Добро пожаловать домой! Этот бот создан для посткроссинга бёрнеров по всему миру. \
Здесь ты можешь оставить свой адрес для писем, а можешь получить адрес кого-нибудь из друзей. \
Отправь команду /give_me_some чтобы получить рандомный адрес получателя. \
Если ты хочешь получить адрес кого-то особенного, то можешь добавить его ник в телеграме после команды.\n\n\
Чтобы добавить свои адрес, ник в инстаграме, ФИО или пожелания для отправителя, напиши соответствующие команды:\n\n\
/add_address - добавить адрес\n\
/add_instagram - добавить инстаграм\n\
/add_name - добавить ФИО\n\
/add_wishes - добавить пожелания (что ты хочешь получить по почте)\n\n\
Если хочешь посмотреть свои данные, то отправь команду /my_data";

/// File name under which the help document is cached.
pub const HELP_DOCUMENT_NAME: &str = "help";

pub const APOLOGY: &str =
    "Тут какая-то ошибка произошла... Напишите прогеру t.me/grbit, пусть починит.";

pub const UNKNOWN: &str = "Ну я хз. Не понимаю что от меня хотят. Может `/help`?";

pub const NO_USERNAME: &str = "У тебя не задан ник в Telegram, а я узнаю людей только по нему. \
Добавь его в настройках профиля и попробуй ещё раз.";

pub const EMPTY_TEXT: &str =
    "Ты не написал ничего. Я понимаю только текст. Напиши ник в Telegram например.";

pub const GIVE_PROMPT: &str = "Отлично! Теперь напиши ник в Telegram/Instagram чтобы я мог найти адрес. \
Или, если хочешь случайный адрес, то просто напиши \"ok\".";

pub const NO_ADDRESS: &str = "Ты не добавил адрес. Напиши /add_address чтобы добавить.";

pub const NOT_APPROVED: &str = "Модераторы ещё не одобрили твои данные. Подожди немного или напиши @rain_aroma. \
Мы стараемся давать доступ только проверенным людям.";

pub const RANDOM_PREFIX: &str = "Корейский рандом сказал дать тебе это:\n";

pub const DIRECTORY_EMPTY: &str = "Пока в базе нет ни одного адреса. Загляни попозже.";

pub const NOTHING_FOUND: &str = "Я ничего не нашёл =(";

pub const FOUND_ONE: &str = "Я нашёл!\n";

pub const FOUND_MANY: &str = "Ого, да тут много адресов...\n";

pub const ADDRESS_PROMPT: &str = "Давай добавим адрес! Просто напиши его в следующем сообщении.";

pub const ADDRESS_TOO_SHORT: &str =
    "Сомневаюсь что это твой адрес, какой-то он короткий. Попробуй ещё раз.";

pub const ADDRESS_SAVED: &str = "Адрес добавлен!";

pub const SECONDARY_PROMPT: &str =
    "Давай добавим Instagram! Просто напиши свой ник в следующем сообщении.";

pub const SECONDARY_INVALID: &str = "Это не похоже на ник в Instagram. Попробуй ещё раз.";

pub const SECONDARY_SAVED: &str = "Instagram добавлен!";

pub const WISHES_PROMPT: &str = "Давай добавим пожелания! Просто напиши их в следующем сообщении.";

pub const WISHES_SAVED: &str = "Пожелания добавлены!";

pub const NAME_PROMPT: &str = "Давай добавим ФИО! Просто напиши их в следующем сообщении.";

pub const NAME_SAVED: &str = "ФИО добавлены!";

pub const MY_DATA_EMPTY: &str = "Ты ещё не добавил свои данные. Начни с адреса /add_address";

pub const MY_DATA_PREFIX: &str = "Вот твои данные:\n";

/// Numbered block for one of several search results (1-based).
pub fn numbered(index: usize, body: &str) -> String {
    format!("Номер {index}:\n{body}\n")
}
